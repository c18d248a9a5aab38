// crates/metrics-shard-core/src/core/layout.rs
// ============================================================================
// Module: Shard Layout
// Description: Shard counts and the pure placement math built on them.
// Purpose: Compute database and table indices deterministically.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`ShardLayout`] owns the shard counts and is the only place that divides
//! by them. Counts are range checked at construction, so every method is
//! total.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::DbIndex;
use crate::core::identifiers::TenantId;
use crate::core::shard::NO_TABLE_INDEX;
use crate::core::shard::Shard;
use crate::core::shard::physical_table_name;
use crate::core::shard::shard_data_source_key;
use crate::core::template::TemplateTable;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum number of shard databases.
pub const MIN_SHARD_DB_COUNT: u32 = 1;
/// Maximum number of shard databases.
pub const MAX_SHARD_DB_COUNT: u32 = 10;
/// Minimum number of secondary tables per template.
pub const MIN_SHARD_TABLE_COUNT: u32 = 1;
/// Maximum number of secondary tables per template.
pub const MAX_SHARD_TABLE_COUNT: u32 = 50;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Shard layout construction errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Database count outside the supported range.
    #[error(
        "shard layout invalid: shard_db_count must be between {min} and {max} (got {0})",
        min = MIN_SHARD_DB_COUNT,
        max = MAX_SHARD_DB_COUNT
    )]
    DbCount(u32),
    /// Table count outside the supported range.
    #[error(
        "shard layout invalid: shard_table_count must be between {min} and {max} (got {0})",
        min = MIN_SHARD_TABLE_COUNT,
        max = MAX_SHARD_TABLE_COUNT
    )]
    TableCount(u32),
}

// ============================================================================
// SECTION: Layout
// ============================================================================

/// Shard counts and second-level sharding switch.
///
/// # Invariants
/// - `shard_db_count` is within `[1, 10]`.
/// - `shard_table_count` is within `[1, 50]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShardLayout {
    /// Number of physical shard databases.
    shard_db_count: u32,
    /// Number of secondary tables per template.
    shard_table_count: u32,
    /// Whether second-level table sharding is enabled.
    second_level: bool,
}

impl ShardLayout {
    /// Creates a layout after range checking the counts.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] when a count is out of range.
    pub const fn new(
        shard_db_count: u32,
        shard_table_count: u32,
        second_level: bool,
    ) -> Result<Self, LayoutError> {
        if shard_db_count < MIN_SHARD_DB_COUNT || shard_db_count > MAX_SHARD_DB_COUNT {
            return Err(LayoutError::DbCount(shard_db_count));
        }
        if shard_table_count < MIN_SHARD_TABLE_COUNT || shard_table_count > MAX_SHARD_TABLE_COUNT
        {
            return Err(LayoutError::TableCount(shard_table_count));
        }
        Ok(Self {
            shard_db_count,
            shard_table_count,
            second_level,
        })
    }

    /// Returns the number of shard databases.
    #[must_use]
    pub const fn shard_db_count(&self) -> u32 {
        self.shard_db_count
    }

    /// Returns the number of secondary tables per template.
    #[must_use]
    pub const fn shard_table_count(&self) -> u32 {
        self.shard_table_count
    }

    /// Returns true when second-level table sharding is enabled.
    #[must_use]
    pub const fn second_level_enabled(&self) -> bool {
        self.second_level
    }

    /// Returns `tenant_id mod shard_db_count`.
    #[must_use]
    pub fn db_index(&self, tenant_id: TenantId) -> DbIndex {
        let index = tenant_id.get().rem_euclid(i64::from(self.shard_db_count));
        // index < shard_db_count <= MAX_SHARD_DB_COUNT
        i32::try_from(index).ok().and_then(DbIndex::from_raw).unwrap_or(DbIndex::ZERO)
    }

    /// Returns `secondary mod shard_table_count`, or [`NO_TABLE_INDEX`] when
    /// second-level sharding is off or `secondary` is negative.
    #[must_use]
    pub fn table_index(&self, secondary: i64) -> i64 {
        if !self.second_level || secondary < 0 {
            return NO_TABLE_INDEX;
        }
        secondary % i64::from(self.shard_table_count)
    }

    /// Returns the datasource key for a tenant.
    #[must_use]
    pub fn data_source_key(&self, tenant_id: TenantId) -> String {
        shard_data_source_key(self.db_index(tenant_id))
    }

    /// Builds the routing shard for a tenant and optional secondary value.
    #[must_use]
    pub fn shard_for(&self, tenant_id: TenantId, secondary: Option<i64>) -> Shard {
        let db_index = self.db_index(tenant_id);
        Shard {
            tenant_id,
            db_index,
            data_source_key: shard_data_source_key(db_index),
            table_second_index: secondary.map_or(NO_TABLE_INDEX, |value| self.table_index(value)),
        }
    }

    /// Returns every physical table name a template expands to for a tenant.
    #[must_use]
    pub fn table_names(&self, template: TemplateTable, tenant_id: TenantId) -> Vec<String> {
        if self.second_level {
            (0 .. i64::from(self.shard_table_count))
                .map(|index| physical_table_name(template, tenant_id, Some(index)))
                .collect()
        } else {
            vec![physical_table_name(template, tenant_id, None)]
        }
    }

    /// Iterates over every shard database index.
    pub fn db_indices(&self) -> impl Iterator<Item = DbIndex> {
        (0 .. self.shard_db_count)
            .filter_map(|index| i32::try_from(index).ok().and_then(DbIndex::from_raw))
    }
}
