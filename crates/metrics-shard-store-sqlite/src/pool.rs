// crates/metrics-shard-store-sqlite/src/pool.rs
// ============================================================================
// Module: SQLite Connection Manager
// Description: r2d2 connection manager for SQLite database files.
// Purpose: Open pooled SQLite connections with consistent pragmas.
// Dependencies: metrics-shard-{config, pool}, r2d2, rusqlite
// ============================================================================

//! ## Overview
//! Every pooled connection is opened read-write with create, then gets the
//! same pragmas: foreign keys on, WAL journaling, full sync, and a busy
//! timeout equal to the configured connect timeout. Connections are checked
//! with `SELECT 1` when checkout validation is enabled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use metrics_shard_config::DataSourceConfig;
use metrics_shard_config::DatabaseBackend;
use metrics_shard_config::PoolConfig;
use metrics_shard_pool::ManagerFactory;
use metrics_shard_pool::RoutingError;
use r2d2::ManageConnection;
use rusqlite::Connection;
use rusqlite::OpenFlags;

// ============================================================================
// SECTION: Connection Manager
// ============================================================================

/// r2d2 manager opening connections to one `SQLite` file.
#[derive(Debug, Clone)]
pub struct SqliteConnectionManager {
    /// Database file path.
    path: PathBuf,
    /// Busy timeout applied to every connection.
    busy_timeout: Duration,
}

impl SqliteConnectionManager {
    /// Creates a manager for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
        }
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ManageConnection for SqliteConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(&self.path, flags)?;
        apply_pragmas(&connection, self.busy_timeout)?;
        Ok(connection)
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).map(|_| ())
    }

    fn has_broken(&self, _conn: &mut Connection) -> bool {
        false
    }
}

/// Applies the pragmas every pooled connection shares.
fn apply_pragmas(connection: &Connection, busy_timeout: Duration) -> Result<(), rusqlite::Error> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.execute_batch("PRAGMA journal_mode = wal;")?;
    connection.execute_batch("PRAGMA synchronous = full;")?;
    connection.busy_timeout(busy_timeout)
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Builds [`SqliteConnectionManager`]s from datasource settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteManagerFactory;

impl ManagerFactory for SqliteManagerFactory {
    type Manager = SqliteConnectionManager;

    fn manager(
        &self,
        source: &DataSourceConfig,
        pool: &PoolConfig,
    ) -> Result<SqliteConnectionManager, RoutingError> {
        if source.backend != DatabaseBackend::Sqlite {
            return Err(RoutingError::Config(format!(
                "sqlite factory cannot open a {} datasource",
                source.backend
            )));
        }
        let path = PathBuf::from(&source.url);
        ensure_parent_dir(&path)?;
        Ok(SqliteConnectionManager::new(path, pool.connect_timeout()))
    }
}

/// Creates the parent directory of a database file when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), RoutingError> {
    if path.is_dir() {
        return Err(RoutingError::Config(format!(
            "sqlite datasource {} must be a file, not a directory",
            path.display()
        )));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|err| RoutingError::Config(format!("{}: {err}", parent.display()))),
        _ => Ok(()),
    }
}
