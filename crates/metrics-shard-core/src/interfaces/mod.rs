// crates/metrics-shard-core/src/interfaces/mod.rs
// ============================================================================
// Module: Metrics Shard Interfaces
// Description: Backend-agnostic contracts for durable shard table storage.
// Purpose: Let the table schema manager run against any SQL backend.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! A [`ShardTableBackend`] owns the durable `shard_tables` registry and the
//! physical DDL execution on each shard database. Implementations must run
//! the DDL and the record insert in one transaction per table, and must
//! report a table that already exists as [`TableCreation::AlreadyExists`]
//! rather than as an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::DbIndex;
use crate::core::ShardTableRecord;
use crate::core::TenantId;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Request to materialize one physical table on a shard database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateTableRequest<'a> {
    /// Shard database that receives the table.
    pub db_index: DbIndex,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Physical table name.
    pub table_name: &'a str,
    /// Rendered DDL for the table.
    pub ddl: &'a str,
}

/// Outcome of a successful create attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableCreation {
    /// The DDL ran and the record was persisted.
    Created(ShardTableRecord),
    /// The table already existed; the record is now present.
    AlreadyExists(ShardTableRecord),
}

impl TableCreation {
    /// Returns the persisted record.
    #[must_use]
    pub const fn record(&self) -> &ShardTableRecord {
        match self {
            Self::Created(record) | Self::AlreadyExists(record) => record,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Backend storage errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection or pool failure.
    #[error("shard table backend io error: {0}")]
    Io(String),
    /// Database engine error.
    #[error("shard table backend db error: {0}")]
    Db(String),
    /// Stored data is invalid.
    #[error("shard table backend invalid data: {0}")]
    Invalid(String),
    /// Requested shard database is not registered.
    #[error("shard table backend unknown shard: {0}")]
    UnknownShard(DbIndex),
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Durable shard table registry plus DDL execution.
pub trait ShardTableBackend: Send + Sync {
    /// Loads every shard table record across all shard databases.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when any shard cannot be read.
    fn load_all(&self) -> Result<Vec<ShardTableRecord>, BackendError>;

    /// Loads the records of one tenant from its shard database.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the shard cannot be read.
    fn load_tenant(
        &self,
        db_index: DbIndex,
        tenant_id: TenantId,
    ) -> Result<Vec<ShardTableRecord>, BackendError>;

    /// Creates one table and persists its record in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the DDL or the record insert fails for
    /// any reason other than the table already existing.
    fn create_table(&self, request: &CreateTableRequest<'_>)
    -> Result<TableCreation, BackendError>;
}

impl<T: ShardTableBackend + ?Sized> ShardTableBackend for Arc<T> {
    fn load_all(&self) -> Result<Vec<ShardTableRecord>, BackendError> {
        (**self).load_all()
    }

    fn load_tenant(
        &self,
        db_index: DbIndex,
        tenant_id: TenantId,
    ) -> Result<Vec<ShardTableRecord>, BackendError> {
        (**self).load_tenant(db_index, tenant_id)
    }

    fn create_table(
        &self,
        request: &CreateTableRequest<'_>,
    ) -> Result<TableCreation, BackendError> {
        (**self).create_table(request)
    }
}
