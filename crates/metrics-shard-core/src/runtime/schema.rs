// crates/metrics-shard-core/src/runtime/schema.rs
// ============================================================================
// Module: Table Schema Manager
// Description: Lazy, idempotent provisioning of per-tenant shard tables.
// Purpose: Guarantee a tenant's physical tables exist before they are queried.
// Dependencies: crate::{core, interfaces}, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`TableSchemaManager`] owns the created-table registry, an in-memory cache
//! over the durable `shard_tables` records held by a [`ShardTableBackend`].
//! The registry only grows and is never authoritative: whenever a tenant's
//! expected tables are not all cached, the manager reloads that tenant's
//! records before creating anything, so tables created by other process
//! instances are adopted instead of re-created.
//!
//! Provisioning is best-effort per table. A failed table is logged and
//! reported, and the remaining tables are still attempted.
//!
//! ## Lifecycle
//! The manager starts Uninitialized. [`TableSchemaManager::initialize`]
//! loads every template and every durable record; only a fully successful
//! load moves it to Ready. Provisioning requests made while Uninitialized
//! are skipped and logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use serde::Serialize;
use thiserror::Error;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::core::DbIndex;
use crate::core::ShardLayout;
use crate::core::TemplateCatalog;
use crate::core::TemplateError;
use crate::core::TemplateSchema;
use crate::core::TemplateSource;
use crate::core::TenantId;
use crate::interfaces::BackendError;
use crate::interfaces::CreateTableRequest;
use crate::interfaces::ShardTableBackend;
use crate::interfaces::TableCreation;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Table schema manager errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The manager has not been initialized.
    #[error("table schema manager not ready")]
    NotReady,
    /// Durable storage failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// Template loading failed.
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// A registry lock was poisoned.
    #[error("table schema manager lock poisoned: {0}")]
    Poisoned(String),
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// How a provisioning request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionPath {
    /// The manager is not initialized; nothing was checked.
    Skipped,
    /// Every expected table was already registered.
    FastPath,
    /// Every expected table was found after reloading durable records.
    Reloaded,
    /// At least one table creation was attempted.
    Provisioned,
}

/// Per-table creation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    /// Physical table name.
    pub table_name: String,
    /// Rendered backend error.
    pub error: String,
}

/// Outcome of one [`TableSchemaManager::check_and_create`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    /// Tenant that was provisioned.
    pub tenant_id: TenantId,
    /// Shard database holding the tenant's tables.
    pub db_index: DbIndex,
    /// Path the request took.
    pub path: ProvisionPath,
    /// Tables created by this call.
    pub created: Vec<String>,
    /// Tables found to already exist on the database and adopted.
    pub adopted: Vec<String>,
    /// Tables whose creation failed.
    pub failed: Vec<TableFailure>,
}

impl ProvisionReport {
    /// Creates an empty report.
    const fn new(tenant_id: TenantId, db_index: DbIndex, path: ProvisionPath) -> Self {
        Self {
            tenant_id,
            db_index,
            path,
            created: Vec::new(),
            adopted: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Returns true when no table creation failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.path != ProvisionPath::Skipped && self.failed.is_empty()
    }
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Provisions per-tenant tables from templates and caches their existence.
///
/// # Invariants
/// - The registry holds every table this process created, adopted, or
///   loaded; names are never removed.
/// - At most one provisioning pass runs at a time per manager.
pub struct TableSchemaManager {
    /// Shard counts.
    layout: ShardLayout,
    /// Durable records and DDL execution.
    backend: Arc<dyn ShardTableBackend>,
    /// Templates; set once initialization succeeds.
    catalog: OnceLock<TemplateCatalog>,
    /// Created-table registry.
    registry: RwLock<BTreeSet<String>>,
    /// Serializes slow-path provisioning.
    provision_lock: Mutex<()>,
}

impl std::fmt::Debug for TableSchemaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSchemaManager")
            .field("layout", &self.layout)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl TableSchemaManager {
    /// Creates an uninitialized manager.
    #[must_use]
    pub fn new(layout: ShardLayout, backend: Arc<dyn ShardTableBackend>) -> Self {
        Self {
            layout,
            backend,
            catalog: OnceLock::new(),
            registry: RwLock::new(BTreeSet::new()),
            provision_lock: Mutex::new(()),
        }
    }

    /// Returns the shard layout.
    #[must_use]
    pub const fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    /// Loads templates and durable records, moving the manager to Ready.
    ///
    /// Calling this on a Ready manager is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Template`] when any template is missing or
    /// invalid and [`SchemaError::Backend`] when records cannot be loaded. The
    /// manager stays Uninitialized on error.
    pub fn initialize(&self, source: &TemplateSource) -> Result<(), SchemaError> {
        if self.is_ready() {
            return Ok(());
        }
        let catalog = source.load().inspect_err(|err| {
            error!(error = %err, "template load failed; table provisioning disabled");
        })?;
        let records = self.backend.load_all().inspect_err(|err| {
            error!(error = %err, "shard table records load failed");
        })?;
        let loaded = records.len();
        self.write_registry()?.extend(records.into_iter().map(|record| record.table_name));
        let templates = catalog.len();
        if self.catalog.set(catalog).is_err() {
            return Ok(());
        }
        info!(templates, tables = loaded, "table schema manager ready");
        Ok(())
    }

    /// Returns true once initialization has succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.catalog.get().is_some()
    }

    /// Returns the loaded template catalog.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotReady`] before initialization.
    pub fn catalog(&self) -> Result<&TemplateCatalog, SchemaError> {
        self.catalog.get().ok_or(SchemaError::NotReady)
    }

    /// Returns true when `table_name` is in the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Poisoned`] when the registry lock is poisoned.
    pub fn registry_contains(&self, table_name: &str) -> Result<bool, SchemaError> {
        Ok(self.read_registry()?.contains(table_name))
    }

    /// Returns a sorted copy of the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Poisoned`] when the registry lock is poisoned.
    pub fn registered_tables(&self) -> Result<Vec<String>, SchemaError> {
        Ok(self.read_registry()?.iter().cloned().collect())
    }

    /// Ensures every physical table of `tenant_id` exists.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Backend`] when the tenant's records cannot be
    /// reloaded and [`SchemaError::Poisoned`] on lock poisoning. Individual
    /// table creation failures are reported in [`ProvisionReport::failed`].
    pub fn check_and_create(&self, tenant_id: TenantId) -> Result<ProvisionReport, SchemaError> {
        let db_index = self.layout.db_index(tenant_id);
        let Ok(catalog) = self.catalog() else {
            warn!(%tenant_id, "table schema manager not ready; skipping table creation");
            return Ok(ProvisionReport::new(tenant_id, db_index, ProvisionPath::Skipped));
        };
        let expected = self.expected_tables(catalog, tenant_id);

        if self.missing(&expected)?.is_empty() {
            return Ok(ProvisionReport::new(tenant_id, db_index, ProvisionPath::FastPath));
        }

        let _guard = self.provision_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.missing(&expected)?.is_empty() {
            return Ok(ProvisionReport::new(tenant_id, db_index, ProvisionPath::FastPath));
        }

        let records = self.backend.load_tenant(db_index, tenant_id)?;
        self.write_registry()?.extend(records.into_iter().map(|record| record.table_name));
        let missing = self.missing(&expected)?;
        if missing.is_empty() {
            return Ok(ProvisionReport::new(tenant_id, db_index, ProvisionPath::Reloaded));
        }

        let mut report = ProvisionReport::new(tenant_id, db_index, ProvisionPath::Provisioned);
        for (schema, table_name) in missing {
            let ddl = schema.render(table_name);
            let request = CreateTableRequest {
                db_index,
                tenant_id,
                table_name,
                ddl: &ddl,
            };
            match self.backend.create_table(&request) {
                Ok(TableCreation::Created(_)) => {
                    info!(%tenant_id, %db_index, table = table_name, "created shard table");
                    report.created.push(table_name.to_string());
                }
                Ok(TableCreation::AlreadyExists(_)) => {
                    info!(%tenant_id, %db_index, table = table_name, "adopted existing shard table");
                    report.adopted.push(table_name.to_string());
                }
                Err(err) => {
                    error!(
                        %tenant_id,
                        %db_index,
                        table = table_name,
                        error = %err,
                        "shard table creation failed"
                    );
                    report.failed.push(TableFailure {
                        table_name: table_name.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }
        self.write_registry()?.extend(report.created.iter().chain(&report.adopted).cloned());
        Ok(report)
    }

    /// Lists `(template, physical name)` pairs expected for a tenant.
    fn expected_tables<'c>(
        &self,
        catalog: &'c TemplateCatalog,
        tenant_id: TenantId,
    ) -> Vec<(&'c TemplateSchema, String)> {
        catalog
            .schemas()
            .flat_map(|schema| {
                self.layout
                    .table_names(schema.table(), tenant_id)
                    .into_iter()
                    .map(move |name| (schema, name))
            })
            .collect()
    }

    /// Returns the expected entries not yet in the registry.
    fn missing<'e, 'c>(
        &self,
        expected: &'e [(&'c TemplateSchema, String)],
    ) -> Result<Vec<(&'c TemplateSchema, &'e str)>, SchemaError> {
        let registry = self.read_registry()?;
        Ok(expected
            .iter()
            .filter(|(_, name)| !registry.contains(name))
            .map(|(schema, name)| (*schema, name.as_str()))
            .collect())
    }

    /// Acquires the registry for reading.
    fn read_registry(&self) -> Result<RwLockReadGuard<'_, BTreeSet<String>>, SchemaError> {
        self.registry.read().map_err(|_| SchemaError::Poisoned("registry".to_string()))
    }

    /// Acquires the registry for writing.
    fn write_registry(&self) -> Result<RwLockWriteGuard<'_, BTreeSet<String>>, SchemaError> {
        self.registry.write().map_err(|_| SchemaError::Poisoned("registry".to_string()))
    }
}
