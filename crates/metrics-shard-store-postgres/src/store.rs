// crates/metrics-shard-store-postgres/src/store.rs
// ============================================================================
// Module: Postgres Shard Table Backend
// Description: Durable shard_tables registry and DDL execution on Postgres.
// Purpose: Persist which per-tenant tables exist on each shard database.
// Dependencies: metrics-shard-{core, pool}, postgres, r2d2_postgres, thiserror
// ============================================================================

//! ## Overview
//! Each shard database owns a `shard_tables` registry created on
//! construction. Postgres DDL is transactional, so the table and its record
//! commit together. Two instances racing on the same `CREATE TABLE` surface
//! either `duplicate_table` or a `unique_violation` on a system catalog index,
//! depending on which catalog row collides first. Either error rolls back the
//! losing transaction; the table is then looked up again in a fresh one and,
//! when present, adopted with its registry record.

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
use postgres::Row;
use postgres::Transaction;
use postgres::error::DbError;
use postgres::error::SqlState;
use r2d2::PooledConnection;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use crate::pool::PostgresManager;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Registry schema created in every shard database.
const SHARD_TABLES_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS shard_tables (
        id BIGSERIAL PRIMARY KEY,
        db_index INTEGER NOT NULL,
        table_name TEXT NOT NULL UNIQUE,
        tenant_id BIGINT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS shard_tables_tenant_idx ON shard_tables (tenant_id);";

/// Routing datasource over Postgres databases.
pub type PostgresRouter = RoutingDataSource<PostgresManager>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Postgres shard table store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostgresStoreError {
    /// Connection checkout failed.
    #[error("postgres store io error: {0}")]
    Io(String),
    /// Postgres error.
    #[error("postgres store error: {0}")]
    Postgres(String),
    /// Invalid data error.
    #[error("postgres store invalid data: {0}")]
    Invalid(String),
    /// The shard database has no pool.
    #[error("postgres store unknown shard: {0}")]
    UnknownShard(DbIndex),
}

impl From<PostgresStoreError> for BackendError {
    fn from(error: PostgresStoreError) -> Self {
        match error {
            PostgresStoreError::Io(message) => Self::Io(message),
            PostgresStoreError::Postgres(message) => Self::Db(message),
            PostgresStoreError::Invalid(message) => Self::Invalid(message),
            PostgresStoreError::UnknownShard(db_index) => Self::UnknownShard(db_index),
        }
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Postgres implementation of [`ShardTableBackend`].
#[derive(Debug, Clone)]
pub struct PostgresShardTableBackend {
    /// Pools for every shard database.
    router: Arc<PostgresRouter>,
}

impl PostgresShardTableBackend {
    /// Creates the backend and the `shard_tables` registry on every shard.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresStoreError`] when a shard cannot be reached or the
    /// registry schema cannot be created.
    pub fn new(router: Arc<PostgresRouter>) -> Result<Self, PostgresStoreError> {
        let backend = Self {
            router,
        };
        for db_index in backend.router.layout().db_indices() {
            let mut client = backend.connection(db_index)?;
            client
                .batch_execute(SHARD_TABLES_SCHEMA)
                .map_err(|err| postgres_error(&err))?;
            debug!(%db_index, "shard_tables registry ready");
        }
        Ok(backend)
    }

    /// Returns the routing datasource.
    #[must_use]
    pub fn router(&self) -> &PostgresRouter {
        &self.router
    }

    /// Checks out a connection to one shard database.
    fn connection(
        &self,
        db_index: DbIndex,
    ) -> Result<PooledConnection<PostgresManager>, PostgresStoreError> {
        self.router.for_db_index(db_index).map_err(|err| match err {
            RoutingError::UnknownDataSource(_) => PostgresStoreError::UnknownShard(db_index),
            other => PostgresStoreError::Io(other.to_string()),
        })
    }

    /// Loads registry rows from one shard, optionally for a single tenant.
    fn query_records(
        &self,
        db_index: DbIndex,
        tenant_id: Option<TenantId>,
    ) -> Result<Vec<ShardTableRecord>, PostgresStoreError> {
        let mut client = self.connection(db_index)?;
        let rows = match tenant_id {
            Some(tenant_id) => client.query(
                "SELECT id, db_index, table_name, tenant_id FROM shard_tables
                 WHERE tenant_id = $1 ORDER BY id",
                &[&tenant_id.get()],
            ),
            None => client.query(
                "SELECT id, db_index, table_name, tenant_id FROM shard_tables ORDER BY id",
                &[],
            ),
        }
        .map_err(|err| postgres_error(&err))?;
        rows.iter().map(read_row).collect()
    }

    /// Runs the create transaction for one table.
    fn create_in_shard(
        &self,
        request: &CreateTableRequest<'_>,
    ) -> Result<TableCreation, PostgresStoreError> {
        let mut client = self.connection(request.db_index)?;
        let mut tx = client.transaction().map_err(|err| postgres_error(&err))?;
        let existed = table_exists(&mut tx, request.table_name)?;
        if !existed && let Err(err) = tx.batch_execute(request.ddl) {
            let constraint = err.as_db_error().and_then(DbError::constraint);
            if !is_concurrent_create(err.code(), constraint) {
                return Err(postgres_error(&err));
            }
            drop(tx);
            debug!(
                db_index = %request.db_index,
                table = request.table_name,
                code = err.code().map_or("", SqlState::code),
                "concurrent create detected; rechecking table"
            );
            let mut retry = client.transaction().map_err(|err| postgres_error(&err))?;
            if !table_exists(&mut retry, request.table_name)? {
                return Err(postgres_error(&err));
            }
            let record = persist_record(&mut retry, request)?;
            retry.commit().map_err(|err| postgres_error(&err))?;
            log_adopted(request);
            return Ok(TableCreation::AlreadyExists(record));
        }
        let record = persist_record(&mut tx, request)?;
        tx.commit().map_err(|err| postgres_error(&err))?;
        if existed {
            log_adopted(request);
            return Ok(TableCreation::AlreadyExists(record));
        }
        Ok(TableCreation::Created(record))
    }
}

impl ShardTableBackend for PostgresShardTableBackend {
    fn load_all(&self) -> Result<Vec<ShardTableRecord>, BackendError> {
        let mut records = Vec::new();
        for db_index in self.router.layout().db_indices() {
            records.extend(self.query_records(db_index, None)?);
        }
        Ok(records)
    }

    fn load_tenant(
        &self,
        db_index: DbIndex,
        tenant_id: TenantId,
    ) -> Result<Vec<ShardTableRecord>, BackendError> {
        Ok(self.query_records(db_index, Some(tenant_id))?)
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

/// System catalog indexes that collide when two sessions create the same
/// relation concurrently.
const CATALOG_NAME_INDEXES: [&str; 2] =
    ["pg_type_typname_nsp_index", "pg_class_relname_nsp_index"];

/// Returns true when a DDL failure means another session created the relation.
///
/// `duplicate_table` is reported when the peer committed before this
/// statement started; a `unique_violation` on a catalog name index is
/// reported when both statements were in flight at once.
pub(crate) fn is_concurrent_create(code: Option<&SqlState>, constraint: Option<&str>) -> bool {
    match code {
        Some(code) if *code == SqlState::DUPLICATE_TABLE => true,
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => {
            constraint.is_some_and(|name| CATALOG_NAME_INDEXES.contains(&name))
        }
        _ => false,
    }
}

/// Renders a Postgres error with the server's code and message when present.
fn postgres_error(err: &postgres::Error) -> PostgresStoreError {
    match err.as_db_error() {
        Some(db) => {
            PostgresStoreError::Postgres(format!("{} ({})", db.message(), db.code().code()))
        }
        None => PostgresStoreError::Postgres(err.to_string()),
    }
}

/// Returns true when `table_name` exists in the current schema.
fn table_exists(tx: &mut Transaction<'_>, table_name: &str) -> Result<bool, PostgresStoreError> {
    let row = tx
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables
             WHERE table_schema = current_schema() AND table_name = $1)",
            &[&table_name],
        )
        .map_err(|err| postgres_error(&err))?;
    row.try_get(0).map_err(|err| postgres_error(&err))
}

/// Inserts the record if missing and returns the stored row.
fn persist_record(
    tx: &mut Transaction<'_>,
    request: &CreateTableRequest<'_>,
) -> Result<ShardTableRecord, PostgresStoreError> {
    tx.execute(
        "INSERT INTO shard_tables (db_index, table_name, tenant_id) VALUES ($1, $2, $3)
         ON CONFLICT (table_name) DO NOTHING",
        &[&request.db_index.get(), &request.table_name, &request.tenant_id.get()],
    )
    .map_err(|err| postgres_error(&err))?;
    let row = tx
        .query_one(
            "SELECT id, db_index, table_name, tenant_id FROM shard_tables WHERE table_name = $1",
            &[&request.table_name],
        )
        .map_err(|err| postgres_error(&err))?;
    read_row(&row)
}

/// Decodes one registry row.
fn read_row(row: &Row) -> Result<ShardTableRecord, PostgresStoreError> {
    let id: i64 = row.try_get(0).map_err(|err| PostgresStoreError::Invalid(err.to_string()))?;
    let db_index: i32 =
        row.try_get(1).map_err(|err| PostgresStoreError::Invalid(err.to_string()))?;
    let table_name: String =
        row.try_get(2).map_err(|err| PostgresStoreError::Invalid(err.to_string()))?;
    let tenant_id: i64 =
        row.try_get(3).map_err(|err| PostgresStoreError::Invalid(err.to_string()))?;
    record_from_parts(id, db_index, table_name, tenant_id)
}

/// Validates decoded column values.
pub(crate) fn record_from_parts(
    id: i64,
    db_index: i32,
    table_name: String,
    tenant_id: i64,
) -> Result<ShardTableRecord, PostgresStoreError> {
    let Some(db_index) = DbIndex::from_raw(db_index) else {
        return Err(PostgresStoreError::Invalid(format!(
            "shard_tables row {id} has invalid db_index {db_index}"
        )));
    };
    if table_name.is_empty() {
        return Err(PostgresStoreError::Invalid(format!("shard_tables row {id} has no name")));
    }
    Ok(ShardTableRecord {
        id,
        db_index,
        table_name,
        tenant_id: TenantId::new(tenant_id),
    })
}

/// Logs adoption of a table created elsewhere.
fn log_adopted(request: &CreateTableRequest<'_>) {
    info!(
        db_index = %request.db_index,
        table = request.table_name,
        "postgres table already exists; adopted"
    );
}

// ============================================================================
// SECTION: Tests
// ============================================================================
