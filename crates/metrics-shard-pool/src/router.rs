// crates/metrics-shard-pool/src/router.rs
// ============================================================================
// Module: Dynamic Datasource Router
// Description: Routes connection checkout to the pool of the current shard.
// Purpose: Resolve the physical database from the routing context.
// Dependencies: metrics-shard-{core, config}, r2d2, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`RoutingDataSource`] owns the master pool and one pool per shard
//! database, keyed by datasource key. [`RoutingDataSource::get`] reads
//! [`RoutingContext::data_source_key`] and checks out from the matching pool;
//! with no shard set that is the master pool.
//!
//! A key without a pool means the configured pool count and the shard count
//! disagree. That is a configuration defect: construction rejects it up
//! front, and a checkout that still hits it is logged at error level and
//! returned as [`RoutingError::UnknownDataSource`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use metrics_shard_config::MetricsShardConfig;
use metrics_shard_core::DbIndex;
use metrics_shard_core::MASTER_DATA_SOURCE_KEY;
use metrics_shard_core::RoutingContext;
use metrics_shard_core::ShardLayout;
use metrics_shard_core::shard_data_source_key;
use r2d2::ManageConnection;
use r2d2::Pool;
use r2d2::PooledConnection;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use tracing::info;

use crate::factory::ManagerFactory;
use crate::factory::build_pool;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Routing datasource errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// No pool is registered for the routing key.
    #[error("routing datasource unknown key: {0}")]
    UnknownDataSource(String),
    /// Pool construction or checkout failed.
    #[error("routing datasource pool error for {key}: {message}")]
    Pool {
        /// Datasource key.
        key: String,
        /// Rendered pool error.
        message: String,
    },
    /// Registered shard pools do not match the shard count.
    #[error("routing datasource pool count mismatch: expected {expected} shard pools, found {actual}")]
    PoolCountMismatch {
        /// Configured shard database count.
        expected: u32,
        /// Registered shard pools.
        actual: usize,
    },
    /// Datasource settings are unusable.
    #[error("routing datasource invalid config: {0}")]
    Config(String),
}

// ============================================================================
// SECTION: Diagnostics
// ============================================================================

/// Point-in-time pool usage for one datasource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Datasource key.
    pub key: String,
    /// Open connections.
    pub connections: u32,
    /// Idle connections.
    pub idle_connections: u32,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Pool selector keyed by datasource key.
///
/// # Invariants
/// - Holds exactly `shard_db_count` shard pools plus the master pool.
pub struct RoutingDataSource<M: ManageConnection> {
    /// Shard counts the pools were built for.
    layout: ShardLayout,
    /// Pools by datasource key, master included.
    pools: BTreeMap<String, Pool<M>>,
}

impl<M: ManageConnection> fmt::Debug for RoutingDataSource<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingDataSource")
            .field("layout", &self.layout)
            .field("keys", &self.pools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<M: ManageConnection> RoutingDataSource<M> {
    /// Registers the master pool and one pool per shard, in db index order.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::PoolCountMismatch`] when `shards` does not
    /// hold exactly `shard_db_count` pools.
    pub fn new(
        layout: ShardLayout,
        master: Pool<M>,
        shards: Vec<Pool<M>>,
    ) -> Result<Self, RoutingError> {
        let expected = layout.shard_db_count();
        if usize::try_from(expected).ok() != Some(shards.len()) {
            error!(expected, actual = shards.len(), "shard pool count mismatch");
            return Err(RoutingError::PoolCountMismatch {
                expected,
                actual: shards.len(),
            });
        }
        let mut pools = BTreeMap::new();
        pools.insert(MASTER_DATA_SOURCE_KEY.to_string(), master);
        for (db_index, pool) in layout.db_indices().zip(shards) {
            pools.insert(shard_data_source_key(db_index), pool);
        }
        Ok(Self {
            layout,
            pools,
        })
    }

    /// Builds every pool described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] when a manager cannot be created, a pool
    /// cannot be built, or the shard list does not match the shard count.
    pub fn from_config<F>(config: &MetricsShardConfig, factory: &F) -> Result<Self, RoutingError>
    where
        F: ManagerFactory<Manager = M>,
    {
        let layout = config.layout().map_err(|err| RoutingError::Config(err.to_string()))?;
        let master_manager = factory.manager(&config.master, &config.pool)?;
        let master = build_pool(MASTER_DATA_SOURCE_KEY, master_manager, &config.pool)?;
        let mut shards = Vec::with_capacity(config.shards.len());
        for (db_index, source) in layout.db_indices().zip(&config.shards) {
            let key = shard_data_source_key(db_index);
            let manager = factory.manager(source, &config.pool)?;
            shards.push(build_pool(&key, manager, &config.pool)?);
        }
        if shards.len() != config.shards.len() {
            return Err(RoutingError::PoolCountMismatch {
                expected: layout.shard_db_count(),
                actual: config.shards.len(),
            });
        }
        let router = Self::new(layout, master, shards)?;
        info!(
            shard_db_count = layout.shard_db_count(),
            backend = %config.backend(),
            "routing datasource ready"
        );
        Ok(router)
    }

    /// Returns the shard layout.
    #[must_use]
    pub const fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    /// Checks out a connection for the current routing context.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::UnknownDataSource`] when the current shard has
    /// no pool and [`RoutingError::Pool`] when checkout times out.
    pub fn get(&self) -> Result<PooledConnection<M>, RoutingError> {
        self.by_key(&RoutingContext::data_source_key())
    }

    /// Checks out a connection from the pool registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::UnknownDataSource`] for unregistered keys and
    /// [`RoutingError::Pool`] when checkout times out.
    pub fn by_key(&self, key: &str) -> Result<PooledConnection<M>, RoutingError> {
        self.pool(key)?.get().map_err(|err| RoutingError::Pool {
            key: key.to_string(),
            message: err.to_string(),
        })
    }

    /// Checks out a connection from the shard database at `db_index`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] as for [`RoutingDataSource::by_key`].
    pub fn for_db_index(&self, db_index: DbIndex) -> Result<PooledConnection<M>, RoutingError> {
        self.by_key(&shard_data_source_key(db_index))
    }

    /// Returns the pool registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::UnknownDataSource`] for unregistered keys.
    pub fn pool(&self, key: &str) -> Result<&Pool<M>, RoutingError> {
        self.pools.get(key).ok_or_else(|| {
            error!(data_source = key, "no pool registered for datasource key");
            RoutingError::UnknownDataSource(key.to_string())
        })
    }

    /// Iterates over the registered datasource keys in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    /// Returns pool usage for every datasource.
    #[must_use]
    pub fn status(&self) -> Vec<PoolStatus> {
        self.pools
            .iter()
            .map(|(key, pool)| {
                let state = pool.state();
                PoolStatus {
                    key: key.clone(),
                    connections: state.connections,
                    idle_connections: state.idle_connections,
                }
            })
            .collect()
    }
}
