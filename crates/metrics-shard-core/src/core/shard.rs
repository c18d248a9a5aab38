// crates/metrics-shard-core/src/core/shard.rs
// ============================================================================
// Module: Shard Model
// Description: Per-call shard routing values and durable shard table records.
// Purpose: Define the data carried between resolver, router, and provisioner.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Shard`] is created right before a sharded call and dropped right after
//! it. A [`ShardTableRecord`] is the durable proof that a physical table was
//! created. Physical table names and datasource keys are pure functions of
//! their inputs so existence checks can be repeated safely.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DbIndex;
use crate::core::identifiers::TenantId;
use crate::core::template::TemplateTable;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Datasource key used when no shard is set.
pub const MASTER_DATA_SOURCE_KEY: &str = "masterDataSource";
/// Table index sentinel meaning "no secondary table sharding".
pub const NO_TABLE_INDEX: i64 = -1;
/// Default declared shard-key field.
pub const DEFAULT_SHARD_KEY: &str = "tenantId";

// ============================================================================
// SECTION: Naming
// ============================================================================

/// Returns the datasource key registered for a shard database.
#[must_use]
pub fn shard_data_source_key(db_index: DbIndex) -> String {
    format!("metrics{db_index}DataSource")
}

/// Returns the physical table name for a template, tenant, and table index.
///
/// Negative table indices are treated as "no secondary sharding".
#[must_use]
pub fn physical_table_name(
    template: TemplateTable,
    tenant_id: TenantId,
    table_index: Option<i64>,
) -> String {
    match table_index {
        Some(index) if index >= 0 => format!("{template}-{tenant_id}-{index}"),
        _ => format!("{template}-{tenant_id}"),
    }
}

// ============================================================================
// SECTION: Shard
// ============================================================================

/// Routing decision for a single sharded call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Tenant the call belongs to.
    pub tenant_id: TenantId,
    /// Physical database index.
    pub db_index: DbIndex,
    /// Datasource key the router resolves.
    pub data_source_key: String,
    /// Secondary table index, or [`NO_TABLE_INDEX`].
    pub table_second_index: i64,
}

impl Shard {
    /// Returns the secondary table index when one applies.
    #[must_use]
    pub const fn table_index(&self) -> Option<i64> {
        if self.table_second_index >= 0 { Some(self.table_second_index) } else { None }
    }

    /// Returns the physical table this call targets for a template.
    #[must_use]
    pub fn table_name(&self, template: TemplateTable) -> String {
        physical_table_name(template, self.tenant_id, self.table_index())
    }
}

// ============================================================================
// SECTION: Durable Records
// ============================================================================

/// Durable record of a physically created shard table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardTableRecord {
    /// Storage-assigned row id.
    pub id: i64,
    /// Database index that holds the table.
    pub db_index: DbIndex,
    /// Physical table name.
    pub table_name: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
}
