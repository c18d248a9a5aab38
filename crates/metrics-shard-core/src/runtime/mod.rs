// crates/metrics-shard-core/src/runtime/mod.rs
// ============================================================================
// Module: Metrics Shard Runtime
// Description: Key resolution, routing context, interception, provisioning.
// Purpose: Turn repository calls into shard routing decisions and tables.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules carry the per-call routing state and the process-wide
//! created-table registry. Pure math lives in [`crate::core`]; everything
//! here is either thread-scoped or owned by a single manager instance.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod intercept;
pub mod memory;
pub mod resolver;
pub mod routing;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use intercept::RouteDecision;
pub use intercept::ShardDeclaration;
pub use intercept::ShardInterceptor;
pub use memory::InMemoryShardTableBackend;
pub use resolver::CriteriaFilter;
pub use resolver::CurrentTenant;
pub use resolver::FixedCurrentTenant;
pub use resolver::KeySource;
pub use resolver::NoCurrentTenant;
pub use resolver::ResolvedKey;
pub use resolver::SearchCriterion;
pub use resolver::ShardArg;
pub use resolver::ShardKeyResolver;
pub use resolver::ShardKeyed;
pub use resolver::TenantOwned;
pub use routing::RoutingContext;
pub use routing::RoutingScope;
pub use routing::RoutingSnapshot;
pub use schema::ProvisionPath;
pub use schema::ProvisionReport;
pub use schema::SchemaError;
pub use schema::TableFailure;
pub use schema::TableSchemaManager;
