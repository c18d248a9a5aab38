// crates/metrics-shard-pool/src/factory.rs
// ============================================================================
// Module: Connection Pool Factory
// Description: Builds one configured r2d2 pool per physical database.
// Purpose: Apply shared pool sizing and timeouts to every datasource.
// Dependencies: metrics-shard-config, r2d2, tracing
// ============================================================================

//! ## Overview
//! Pools are built eagerly at startup so an unreachable database fails the
//! process before it serves traffic. Connection errors raised inside r2d2
//! are reported through `tracing` instead of r2d2's default logger.

// ============================================================================
// SECTION: Imports
// ============================================================================

use metrics_shard_config::DataSourceConfig;
use metrics_shard_config::PoolConfig;
use r2d2::HandleError;
use r2d2::ManageConnection;
use r2d2::Pool;
use tracing::debug;
use tracing::warn;

use crate::router::RoutingError;

// ============================================================================
// SECTION: Manager Factory
// ============================================================================

/// Creates r2d2 connection managers for configured datasources.
pub trait ManagerFactory {
    /// Connection manager type shared by every datasource.
    type Manager: ManageConnection;

    /// Creates the manager for one datasource.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Config`] when the datasource settings cannot
    /// be turned into connection parameters.
    fn manager(
        &self,
        source: &DataSourceConfig,
        pool: &PoolConfig,
    ) -> Result<Self::Manager, RoutingError>;
}

// ============================================================================
// SECTION: Error Handler
// ============================================================================

/// r2d2 error handler that reports connection failures through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingErrorHandler {
    /// Datasource key the pool serves.
    key: String,
}

impl TracingErrorHandler {
    /// Creates a handler for the pool serving `key`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
        }
    }
}

impl<E: std::error::Error> HandleError<E> for TracingErrorHandler {
    fn handle_error(&self, error: E) {
        warn!(data_source = %self.key, error = %error, "pooled connection error");
    }
}

// ============================================================================
// SECTION: Pool Builder
// ============================================================================

/// Builds a pool for `key` with the shared sizing and timeouts.
///
/// # Errors
///
/// Returns [`RoutingError::Pool`] when the initial connections cannot be
/// established within the connection timeout.
pub fn build_pool<M: ManageConnection>(
    key: &str,
    manager: M,
    config: &PoolConfig,
) -> Result<Pool<M>, RoutingError> {
    let pool = Pool::builder()
        .max_size(config.max_pool_size)
        .min_idle(Some(config.min_idle))
        .max_lifetime(config.max_lifetime())
        .idle_timeout(config.idle_timeout())
        .connection_timeout(config.connection_timeout())
        .test_on_check_out(config.validate_on_checkout())
        .error_handler(Box::new(TracingErrorHandler::new(key)))
        .build(manager)
        .map_err(|err| RoutingError::Pool {
            key: key.to_string(),
            message: err.to_string(),
        })?;
    debug!(
        data_source = key,
        max_size = config.max_pool_size,
        min_idle = config.min_idle,
        "connection pool ready"
    );
    Ok(pool)
}
