// crates/metrics-shard-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Shard Table Backend
// Description: Process-local shard table backend for tests and demos.
// Purpose: Exercise provisioning without a database.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Physical tables are modeled as names per shard database; DDL is accepted
//! but not parsed. Counters expose how many DDL statements and record writes
//! actually happened so idempotence can be asserted. It is not intended for
//! production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::DbIndex;
use crate::core::ShardTableRecord;
use crate::core::TenantId;
use crate::interfaces::BackendError;
use crate::interfaces::CreateTableRequest;
use crate::interfaces::ShardTableBackend;
use crate::interfaces::TableCreation;

// ============================================================================
// SECTION: State
// ============================================================================

/// Mutable backend state.
#[derive(Debug, Default)]
struct MemoryState {
    /// Physical tables per shard database.
    tables: BTreeMap<DbIndex, BTreeSet<String>>,
    /// Durable records keyed by table name.
    records: BTreeMap<String, ShardTableRecord>,
    /// Last assigned record id.
    last_id: i64,
    /// Table names whose creation fails.
    failing: BTreeSet<String>,
    /// Successful DDL executions.
    ddl_executions: usize,
    /// Record inserts.
    record_writes: usize,
}

impl MemoryState {
    /// Inserts a record with the next id.
    fn insert_record(
        &mut self,
        db_index: DbIndex,
        table_name: &str,
        tenant_id: TenantId,
    ) -> ShardTableRecord {
        self.last_id += 1;
        let record = ShardTableRecord {
            id: self.last_id,
            db_index,
            table_name: table_name.to_string(),
            tenant_id,
        };
        self.records.insert(record.table_name.clone(), record.clone());
        self.record_writes += 1;
        record
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// In-memory shard table backend for tests and demos.
#[derive(Debug, Default, Clone)]
pub struct InMemoryShardTableBackend {
    /// Shared state; clones observe the same tables.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryShardTableBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later creation of `table_name` fail.
    pub fn fail_table(&self, table_name: impl Into<String>) {
        self.lock_state().failing.insert(table_name.into());
    }

    /// Adds a physical table without a durable record.
    pub fn insert_physical_table(&self, db_index: DbIndex, table_name: impl Into<String>) {
        self.lock_state().tables.entry(db_index).or_default().insert(table_name.into());
    }

    /// Adds a physical table and its record, as another process would.
    pub fn insert_record(&self, db_index: DbIndex, table_name: &str, tenant_id: TenantId) {
        let mut state = self.lock_state();
        state.tables.entry(db_index).or_default().insert(table_name.to_string());
        state.insert_record(db_index, table_name, tenant_id);
    }

    /// Returns every durable record ordered by table name.
    #[must_use]
    pub fn records(&self) -> Vec<ShardTableRecord> {
        self.lock_state().records.values().cloned().collect()
    }

    /// Returns true when the table exists on `db_index`.
    #[must_use]
    pub fn has_table(&self, db_index: DbIndex, table_name: &str) -> bool {
        self.lock_state().tables.get(&db_index).is_some_and(|tables| tables.contains(table_name))
    }

    /// Returns the number of successful DDL executions.
    #[must_use]
    pub fn ddl_executions(&self) -> usize {
        self.lock_state().ddl_executions
    }

    /// Returns the number of record writes.
    #[must_use]
    pub fn record_writes(&self) -> usize {
        self.lock_state().record_writes
    }

    /// Locks the state, ignoring poisoning.
    fn lock_state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ShardTableBackend for InMemoryShardTableBackend {
    fn load_all(&self) -> Result<Vec<ShardTableRecord>, BackendError> {
        Ok(self.records())
    }

    fn load_tenant(
        &self,
        db_index: DbIndex,
        tenant_id: TenantId,
    ) -> Result<Vec<ShardTableRecord>, BackendError> {
        Ok(self
            .lock_state()
            .records
            .values()
            .filter(|record| record.db_index == db_index && record.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn create_table(
        &self,
        request: &CreateTableRequest<'_>,
    ) -> Result<TableCreation, BackendError> {
        if request.ddl.trim().is_empty() {
            return Err(BackendError::Invalid(format!("empty ddl for {}", request.table_name)));
        }
        let mut state = self.lock_state();
        if state.failing.contains(request.table_name) {
            return Err(BackendError::Db(format!("injected failure for {}", request.table_name)));
        }
        let exists = state
            .tables
            .get(&request.db_index)
            .is_some_and(|tables| tables.contains(request.table_name));
        if exists {
            let existing = state.records.get(request.table_name).cloned();
            let record = existing.unwrap_or_else(|| {
                state.insert_record(request.db_index, request.table_name, request.tenant_id)
            });
            return Ok(TableCreation::AlreadyExists(record));
        }
        state.tables.entry(request.db_index).or_default().insert(request.table_name.to_string());
        state.ddl_executions += 1;
        let record = state.insert_record(request.db_index, request.table_name, request.tenant_id);
        drop(state);
        Ok(TableCreation::Created(record))
    }
}
