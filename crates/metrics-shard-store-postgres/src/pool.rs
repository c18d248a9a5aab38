// crates/metrics-shard-store-postgres/src/pool.rs
// ============================================================================
// Module: Postgres Manager Factory
// Description: Builds r2d2_postgres managers from datasource settings.
// Purpose: Apply credentials and timeouts to every Postgres pool.
// Dependencies: metrics-shard-{config, pool}, postgres, r2d2, r2d2_postgres
// ============================================================================

//! ## Overview
//! Datasource URLs are parsed into [`postgres::Config`]. Explicit
//! `username`/`password` settings override whatever the URL carries, and the
//! configured connect timeout bounds every physical connection attempt.
//! Checkout validation sends an empty query and gives up after
//! `pool.validation_timeout_ms`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use metrics_shard_config::DataSourceConfig;
use metrics_shard_config::DatabaseBackend;
use metrics_shard_config::PoolConfig;
use metrics_shard_pool::ManagerFactory;
use metrics_shard_pool::RoutingError;
use postgres::Client;
use postgres::NoTls;
use r2d2::ManageConnection;
use r2d2_postgres::PostgresConnectionManager;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Application name reported to the server.
const APPLICATION_NAME: &str = "metrics-shard";

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Postgres connection manager without TLS whose validation is time-bounded.
#[derive(Debug)]
pub struct PostgresManager {
    /// Connects and detects closed clients.
    inner: PostgresConnectionManager<NoTls>,
    /// Upper bound for one validation round trip.
    validation_timeout: Duration,
}

impl PostgresManager {
    /// Creates a manager for `config`.
    #[must_use]
    pub fn new(config: postgres::Config, validation_timeout: Duration) -> Self {
        Self {
            inner: PostgresConnectionManager::new(config, NoTls),
            validation_timeout,
        }
    }

    /// Returns the validation round-trip bound.
    #[must_use]
    pub const fn validation_timeout(&self) -> Duration {
        self.validation_timeout
    }
}

impl ManageConnection for PostgresManager {
    type Connection = Client;
    type Error = postgres::Error;

    fn connect(&self) -> Result<Client, postgres::Error> {
        self.inner.connect()
    }

    fn is_valid(&self, conn: &mut Client) -> Result<(), postgres::Error> {
        conn.is_valid(self.validation_timeout)
    }

    fn has_broken(&self, conn: &mut Client) -> bool {
        self.inner.has_broken(conn)
    }
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Builds [`PostgresManager`]s from datasource settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresManagerFactory;

impl ManagerFactory for PostgresManagerFactory {
    type Manager = PostgresManager;

    fn manager(
        &self,
        source: &DataSourceConfig,
        pool: &PoolConfig,
    ) -> Result<PostgresManager, RoutingError> {
        let config = connection_config(source, pool)?;
        Ok(PostgresManager::new(config, pool.validation_timeout()))
    }
}

/// Parses the connection parameters for one datasource.
///
/// # Errors
///
/// Returns [`RoutingError::Config`] when the datasource is not Postgres or
/// its URL cannot be parsed.
pub fn connection_config(
    source: &DataSourceConfig,
    pool: &PoolConfig,
) -> Result<postgres::Config, RoutingError> {
    if source.backend != DatabaseBackend::Postgres {
        return Err(RoutingError::Config(format!(
            "postgres factory cannot open a {} datasource",
            source.backend
        )));
    }
    let mut config = source
        .url
        .parse::<postgres::Config>()
        .map_err(|err| RoutingError::Config(format!("invalid postgres url: {err}")))?;
    if let Some(user) = &source.username {
        config.user(user);
    }
    if let Some(password) = &source.password {
        config.password(password);
    }
    if config.get_application_name().is_none() {
        config.application_name(APPLICATION_NAME);
    }
    config.connect_timeout(pool.connect_timeout());
    Ok(config)
}
