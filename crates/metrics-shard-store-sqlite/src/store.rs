// crates/metrics-shard-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Shard Table Backend
// Description: Durable shard_tables registry and DDL execution on SQLite.
// Purpose: Persist which per-tenant tables exist on each shard file.
// Dependencies: metrics-shard-{core, pool}, rusqlite, thiserror, tracing
// ============================================================================

//! ## Overview
//! Every shard database carries its own `shard_tables` table, created on
//! construction. A table is materialized inside one immediate transaction:
//! the existence check, the DDL, and the registry insert either all commit
//! or none do. A physical table that already exists is adopted and its
//! record is inserted if missing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use metrics_shard_core::BackendError;
use metrics_shard_core::CreateTableRequest;
use metrics_shard_core::DbIndex;
use metrics_shard_core::ShardTableBackend;
use metrics_shard_core::ShardTableRecord;
use metrics_shard_core::TableCreation;
use metrics_shard_core::TenantId;
use metrics_shard_pool::RoutingDataSource;
use metrics_shard_pool::RoutingError;
use r2d2::PooledConnection;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use crate::pool::SqliteConnectionManager;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Registry schema created in every shard database.
const SHARD_TABLES_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS shard_tables (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        db_index INTEGER NOT NULL,
        table_name TEXT NOT NULL UNIQUE,
        tenant_id INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS shard_tables_tenant_idx ON shard_tables (tenant_id);";

/// Columns selected for a [`ShardTableRecord`].
const RECORD_COLUMNS: &str = "id, db_index, table_name, tenant_id";

/// Routing datasource over `SQLite` files.
pub type SqliteRouter = RoutingDataSource<SqliteConnectionManager>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` shard table store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Connection checkout failed.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data is invalid.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// The shard database has no pool.
    #[error("sqlite store unknown shard: {0}")]
    UnknownShard(DbIndex),
}

impl From<SqliteStoreError> for BackendError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::UnknownShard(db_index) => Self::UnknownShard(db_index),
        }
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// `SQLite` implementation of [`ShardTableBackend`].
#[derive(Debug, Clone)]
pub struct SqliteShardTableBackend {
    /// Pools for every shard database.
    router: Arc<SqliteRouter>,
}

impl SqliteShardTableBackend {
    /// Creates the backend and the `shard_tables` registry on every shard.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when a shard cannot be reached or the
    /// registry schema cannot be created.
    pub fn new(router: Arc<SqliteRouter>) -> Result<Self, SqliteStoreError> {
        let backend = Self {
            router,
        };
        for db_index in backend.router.layout().db_indices() {
            let connection = backend.connection(db_index)?;
            connection
                .execute_batch(SHARD_TABLES_SCHEMA)
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            debug!(%db_index, "shard_tables registry ready");
        }
        Ok(backend)
    }

    /// Returns the routing datasource.
    #[must_use]
    pub fn router(&self) -> &SqliteRouter {
        &self.router
    }

    /// Checks out a connection to one shard database.
    fn connection(
        &self,
        db_index: DbIndex,
    ) -> Result<PooledConnection<SqliteConnectionManager>, SqliteStoreError> {
        self.router.for_db_index(db_index).map_err(|err| match err {
            RoutingError::UnknownDataSource(_) => SqliteStoreError::UnknownShard(db_index),
            other => SqliteStoreError::Io(other.to_string()),
        })
    }

    /// Loads every record stored on one shard database.
    fn load_shard(&self, db_index: DbIndex) -> Result<Vec<ShardTableRecord>, SqliteStoreError> {
        let connection = self.connection(db_index)?;
        let mut stmt = connection
            .prepare(&format!("SELECT {RECORD_COLUMNS} FROM shard_tables ORDER BY id"))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![], read_row)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        collect_records(rows)
    }

    /// Runs the create transaction for one table.
    fn create_in_shard(
        &self,
        request: &CreateTableRequest<'_>,
    ) -> Result<TableCreation, SqliteStoreError> {
        let mut connection = self.connection(request.db_index)?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let existed = table_exists(&tx, request.table_name)?;
        if !existed {
            tx.execute_batch(request.ddl).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        tx.execute(
            "INSERT OR IGNORE INTO shard_tables (db_index, table_name, tenant_id)
             VALUES (?1, ?2, ?3)",
            params![request.db_index.get(), request.table_name, request.tenant_id.get()],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let record = tx
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM shard_tables WHERE table_name = ?1"),
                params![request.table_name],
                read_row,
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?
            .map_err(SqliteStoreError::Invalid)?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if existed {
            info!(
                db_index = %request.db_index,
                table = request.table_name,
                "sqlite table already exists; adopted"
            );
            return Ok(TableCreation::AlreadyExists(record));
        }
        Ok(TableCreation::Created(record))
    }
}

impl ShardTableBackend for SqliteShardTableBackend {
    fn load_all(&self) -> Result<Vec<ShardTableRecord>, BackendError> {
        let mut records = Vec::new();
        for db_index in self.router.layout().db_indices() {
            records.extend(self.load_shard(db_index)?);
        }
        Ok(records)
    }

    fn load_tenant(
        &self,
        db_index: DbIndex,
        tenant_id: TenantId,
    ) -> Result<Vec<ShardTableRecord>, BackendError> {
        let connection = self.connection(db_index)?;
        let mut stmt = connection
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM shard_tables WHERE tenant_id = ?1 ORDER BY id"
            ))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![tenant_id.get()], read_row)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(collect_records(rows)?)
    }

    fn create_table(
        &self,
        request: &CreateTableRequest<'_>,
    ) -> Result<TableCreation, BackendError> {
        Ok(self.create_in_shard(request)?)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when a table named `table_name` exists.
fn table_exists(connection: &Connection, table_name: &str) -> Result<bool, SqliteStoreError> {
    connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table_name],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Reads one registry row; the inner error reports invalid stored values.
fn read_row(row: &Row<'_>) -> rusqlite::Result<Result<ShardTableRecord, String>> {
    let id: i64 = row.get(0)?;
    let db_index: i64 = row.get(1)?;
    let table_name: String = row.get(2)?;
    let tenant_id: i64 = row.get(3)?;
    let Some(db_index) = i32::try_from(db_index).ok().and_then(DbIndex::from_raw) else {
        return Ok(Err(format!("shard_tables row {id} has invalid db_index {db_index}")));
    };
    Ok(Ok(ShardTableRecord {
        id,
        db_index,
        table_name,
        tenant_id: TenantId::new(tenant_id),
    }))
}

/// Collects mapped registry rows.
fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<Result<ShardTableRecord, String>>>,
) -> Result<Vec<ShardTableRecord>, SqliteStoreError> {
    let mut records = Vec::new();
    for row in rows {
        let record = row
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?
            .map_err(SqliteStoreError::Invalid)?;
        records.push(record);
    }
    Ok(records)
}
