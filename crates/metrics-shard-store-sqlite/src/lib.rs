// crates/metrics-shard-store-sqlite/src/lib.rs
// ============================================================================
// Module: Metrics Shard SQLite Store
// Description: SQLite-backed pools and shard table registry.
// Purpose: Run the sharding stack against database files on local disk.
// Dependencies: metrics-shard-{core, config, pool}, r2d2, rusqlite
// ============================================================================

//! ## Overview
//! Each datasource is a `SQLite` database file. [`SqliteManagerFactory`]
//! plugs the files into the routing datasource and
//! [`SqliteShardTableBackend`] keeps the `shard_tables` registry inside every
//! shard file next to the tables it describes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod pool;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use pool::SqliteConnectionManager;
pub use pool::SqliteManagerFactory;
pub use store::SqliteRouter;
pub use store::SqliteShardTableBackend;
pub use store::SqliteStoreError;
