// crates/metrics-shard-core/src/runtime/resolver.rs
// ============================================================================
// Module: Shard Key Resolver
// Description: Extracts tenant and secondary shard keys from call arguments.
// Purpose: Turn heterogeneous repository arguments into a routing key.
// Dependencies: crate::core, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Repository calls pass their arguments to the resolver as [`ShardArg`]
//! values. Sharded entities opt in explicitly through [`TenantOwned`] and
//! [`ShardKeyed`]; no runtime field lookup is performed.
//!
//! Resolution order for a declared field (first match wins):
//! 1. a [`TenantOwned`] argument, when the field is [`DEFAULT_SHARD_KEY`];
//! 2. a collection argument: criteria are scanned for the field, entity
//!    collections read the field off their first element;
//! 3. a [`CriteriaFilter`] argument whose criteria carry the field;
//! 4. the first integer argument;
//! 5. the ambient request tenant, when the field is [`DEFAULT_SHARD_KEY`]
//!    and that tenant is positive.
//!
//! An unresolved key is not an error: the caller routes to master.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::DEFAULT_SHARD_KEY;
use crate::core::TenantId;

// ============================================================================
// SECTION: Capabilities
// ============================================================================

/// Entities and DTOs that belong to a single tenant.
pub trait TenantOwned {
    /// Returns the owning tenant.
    fn tenant_id(&self) -> TenantId;
}

/// Entities and DTOs that expose named integer shard fields.
pub trait ShardKeyed {
    /// Returns the value of `field`, or `None` when the entity has no such
    /// field or it is unset.
    fn shard_field(&self, field: &str) -> Option<i64>;
}

/// Source of the tenant bound to the current request.
pub trait CurrentTenant: Send + Sync {
    /// Returns the request tenant, if any.
    fn current_tenant(&self) -> Option<TenantId>;
}

impl<F> CurrentTenant for F
where
    F: Fn() -> Option<TenantId> + Send + Sync,
{
    fn current_tenant(&self) -> Option<TenantId> {
        self()
    }
}

/// Ambient tenant source for contexts without a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCurrentTenant;

impl CurrentTenant for NoCurrentTenant {
    fn current_tenant(&self) -> Option<TenantId> {
        None
    }
}

/// Ambient tenant source pinned to one tenant (CLI and batch jobs).
#[derive(Debug, Clone, Copy)]
pub struct FixedCurrentTenant(pub TenantId);

impl CurrentTenant for FixedCurrentTenant {
    fn current_tenant(&self) -> Option<TenantId> {
        Some(self.0)
    }
}

// ============================================================================
// SECTION: Criteria
// ============================================================================

/// Generic key/value search criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCriterion {
    /// Field name the criterion applies to.
    pub key: String,
    /// Criterion value.
    pub value: Value,
}

impl SearchCriterion {
    /// Creates a criterion.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns the value as an integer; numeric strings are accepted.
    #[must_use]
    pub fn integer_value(&self) -> Option<i64> {
        match &self.value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Filter/specification object exposing a criteria set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriteriaFilter {
    /// Criteria in declaration order.
    pub criteria: Vec<SearchCriterion>,
}

impl CriteriaFilter {
    /// Creates a filter from criteria.
    #[must_use]
    pub const fn new(criteria: Vec<SearchCriterion>) -> Self {
        Self {
            criteria,
        }
    }

    /// Adds a criterion.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.push(SearchCriterion::new(key, value));
        self
    }
}

/// Returns the integer value of the first criterion keyed by `field`.
fn scan_criteria(criteria: &[SearchCriterion], field: &str) -> Option<i64> {
    criteria.iter().find(|criterion| criterion.key == field).and_then(SearchCriterion::integer_value)
}

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// One argument of an intercepted repository call.
#[derive(Clone, Copy)]
pub enum ShardArg<'a> {
    /// Argument that belongs to a tenant.
    Tenant(&'a dyn TenantOwned),
    /// Single entity exposing shard fields.
    Entity(&'a dyn ShardKeyed),
    /// Ordered collection of entities; only the first element is inspected.
    Entities(Option<&'a dyn ShardKeyed>),
    /// Ordered collection of search criteria.
    Criteria(&'a [SearchCriterion]),
    /// Filter/specification object.
    Filter(&'a CriteriaFilter),
    /// Integer argument.
    Integer(i64),
    /// Argument that carries no shard information.
    Opaque,
}

impl<'a> ShardArg<'a> {
    /// Wraps an entity collection.
    #[must_use]
    pub fn entities<T: ShardKeyed>(items: &'a [T]) -> Self {
        Self::Entities(items.first().map(|item| item as &dyn ShardKeyed))
    }
}

impl fmt::Debug for ShardArg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant(owner) => write!(f, "Tenant({})", owner.tenant_id()),
            Self::Entity(_) => f.write_str("Entity"),
            Self::Entities(first) => write!(f, "Entities(first={})", first.is_some()),
            Self::Criteria(criteria) => write!(f, "Criteria(len={})", criteria.len()),
            Self::Filter(filter) => write!(f, "Filter(len={})", filter.criteria.len()),
            Self::Integer(value) => write!(f, "Integer({value})"),
            Self::Opaque => f.write_str("Opaque"),
        }
    }
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// A [`TenantOwned`] argument.
    TenantOwner,
    /// A collection argument.
    Collection,
    /// A filter argument.
    Filter,
    /// The first integer argument.
    Positional,
    /// The ambient request tenant.
    Ambient,
}

/// Resolved `(field, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedKey {
    /// Declared field name.
    pub field: String,
    /// Resolved value.
    pub value: i64,
    /// Resolution step that matched.
    pub source: KeySource,
}

/// Resolves shard keys from call arguments.
#[derive(Clone)]
pub struct ShardKeyResolver {
    /// Ambient request tenant source.
    current: Arc<dyn CurrentTenant>,
}

impl Default for ShardKeyResolver {
    fn default() -> Self {
        Self::new(Arc::new(NoCurrentTenant))
    }
}

impl fmt::Debug for ShardKeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardKeyResolver").finish_non_exhaustive()
    }
}

impl ShardKeyResolver {
    /// Creates a resolver backed by an ambient tenant source.
    #[must_use]
    pub fn new(current: Arc<dyn CurrentTenant>) -> Self {
        Self {
            current,
        }
    }

    /// Resolves the primary shard key for `field`.
    #[must_use]
    pub fn resolve(&self, args: &[ShardArg<'_>], field: &str) -> Option<ResolvedKey> {
        let is_tenant_field = field == DEFAULT_SHARD_KEY;
        let owner = if is_tenant_field { from_tenant_owner(args) } else { None };
        let found = owner.or_else(|| from_arguments(args, field)).or_else(|| {
            if is_tenant_field { self.ambient_tenant() } else { None }
        });
        match &found {
            Some((value, source)) => {
                debug!(field, value, ?source, "shard key resolved");
            }
            None => {
                debug!(field, "shard key unresolved; routing to master");
            }
        }
        found.map(|(value, source)| ResolvedKey {
            field: field.to_string(),
            value,
            source,
        })
    }

    /// Resolves a secondary sharding field.
    ///
    /// Only collection and filter arguments are searched; positional and
    /// ambient fallbacks apply to the primary key alone.
    #[must_use]
    pub fn resolve_secondary(&self, args: &[ShardArg<'_>], field: &str) -> Option<ResolvedKey> {
        from_collections(args, field)
            .map(|value| (value, KeySource::Collection))
            .or_else(|| from_filters(args, field).map(|value| (value, KeySource::Filter)))
            .map(|(value, source)| ResolvedKey {
                field: field.to_string(),
                value,
                source,
            })
    }

    /// Returns the ambient tenant when it is positive.
    fn ambient_tenant(&self) -> Option<(i64, KeySource)> {
        self.current
            .current_tenant()
            .filter(|tenant| tenant.is_positive())
            .map(|tenant| (tenant.get(), KeySource::Ambient))
    }
}

/// Step 1: the first tenant-owned argument.
fn from_tenant_owner(args: &[ShardArg<'_>]) -> Option<(i64, KeySource)> {
    args.iter().find_map(|arg| match arg {
        ShardArg::Tenant(owner) => Some((owner.tenant_id().get(), KeySource::TenantOwner)),
        _ => None,
    })
}

/// Steps 2 through 4 for a declared field.
fn from_arguments(args: &[ShardArg<'_>], field: &str) -> Option<(i64, KeySource)> {
    from_collections(args, field)
        .map(|value| (value, KeySource::Collection))
        .or_else(|| from_filters(args, field).map(|value| (value, KeySource::Filter)))
        .or_else(|| {
            args.iter().find_map(|arg| match arg {
                ShardArg::Integer(value) => Some((*value, KeySource::Positional)),
                _ => None,
            })
        })
}

/// Step 2: the first collection argument that yields the field.
fn from_collections(args: &[ShardArg<'_>], field: &str) -> Option<i64> {
    args.iter().find_map(|arg| match arg {
        ShardArg::Criteria(criteria) => scan_criteria(criteria, field),
        ShardArg::Entities(Some(first)) | ShardArg::Entity(first) => first.shard_field(field),
        _ => None,
    })
}

/// Step 3: the first filter argument that yields the field.
fn from_filters(args: &[ShardArg<'_>], field: &str) -> Option<i64> {
    args.iter().find_map(|arg| match arg {
        ShardArg::Filter(filter) => scan_criteria(&filter.criteria, field),
        _ => None,
    })
}
