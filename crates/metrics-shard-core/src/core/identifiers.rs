// crates/metrics-shard-core/src/core/identifiers.rs
// ============================================================================
// Module: Metrics Shard Identifiers
// Description: Strongly typed tenant and database index identifiers.
// Purpose: Keep tenant ids and shard indices from being mixed with raw integers.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Tenant identifiers are positive application-level integers. Database
//! indices are derived from tenant ids and are always non-negative; the only
//! way to build one from a raw value is [`DbIndex::from_raw`], which rejects
//! negative input read back from storage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Tenant identifier used as the primary sharding key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(i64);

impl TenantId {
    /// Creates a tenant identifier from its raw value.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Creates a tenant identifier, rejecting zero and negative values.
    #[must_use]
    pub const fn from_raw(id: i64) -> Option<Self> {
        if id > 0 { Some(Self(id)) } else { None }
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Returns true for real (non-anonymous) tenants.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for TenantId {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

/// Index of a physical shard database.
///
/// # Invariants
/// - Always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct DbIndex(i32);

impl DbIndex {
    /// The first shard database.
    pub const ZERO: Self = Self(0);

    /// Creates a database index, returning `None` for negative values.
    #[must_use]
    pub const fn from_raw(index: i32) -> Option<Self> {
        if index >= 0 { Some(Self(index)) } else { None }
    }

    /// Returns the raw index value.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Returns the index as a `usize` for slice addressing.
    #[must_use]
    pub fn as_usize(self) -> usize {
        usize::try_from(self.0.unsigned_abs()).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for DbIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<i32> for DbIndex {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_raw(value).ok_or_else(|| format!("db index must be non-negative: {value}"))
    }
}

impl From<DbIndex> for i32 {
    fn from(value: DbIndex) -> Self {
        value.0
    }
}
