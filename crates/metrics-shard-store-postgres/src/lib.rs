// crates/metrics-shard-store-postgres/src/lib.rs
// ============================================================================
// Module: Metrics Shard Postgres Store
// Description: Postgres-backed pools and shard table registry.
// Purpose: Run the sharding stack against one Postgres database per shard.
// Dependencies: metrics-shard-{core, config, pool}, postgres, r2d2_postgres
// ============================================================================

//! ## Overview
//! [`PostgresManagerFactory`] turns datasource URLs into r2d2 managers for
//! the routing datasource, and [`PostgresShardTableBackend`] keeps the
//! `shard_tables` registry in every shard database.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod pool;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use pool::PostgresManager;
pub use pool::PostgresManagerFactory;
pub use pool::connection_config;
pub use store::PostgresRouter;
pub use store::PostgresShardTableBackend;
pub use store::PostgresStoreError;
