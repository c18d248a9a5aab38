// crates/metrics-shard-core/src/lib.rs
// ============================================================================
// Module: Metrics Shard Core Library
// Description: Public API surface for metrics sharding and table provisioning.
// Purpose: Expose shard math, routing, interception, and schema management.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Metrics shard core spreads per-tenant telemetry across several physical
//! databases and per-tenant tables. A tenant's database is
//! `tenant_id mod shard_db_count`; with second-level sharding enabled its
//! rows are further split across `shard_table_count` tables per template.
//!
//! The crate is backend-agnostic: connection pools live in
//! `metrics-shard-pool` and durable table records are reached through
//! [`ShardTableBackend`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::BackendError;
pub use interfaces::CreateTableRequest;
pub use interfaces::ShardTableBackend;
pub use interfaces::TableCreation;
pub use runtime::CriteriaFilter;
pub use runtime::CurrentTenant;
pub use runtime::FixedCurrentTenant;
pub use runtime::InMemoryShardTableBackend;
pub use runtime::KeySource;
pub use runtime::NoCurrentTenant;
pub use runtime::ProvisionPath;
pub use runtime::ProvisionReport;
pub use runtime::ResolvedKey;
pub use runtime::RouteDecision;
pub use runtime::RoutingContext;
pub use runtime::RoutingScope;
pub use runtime::RoutingSnapshot;
pub use runtime::SchemaError;
pub use runtime::SearchCriterion;
pub use runtime::ShardArg;
pub use runtime::ShardDeclaration;
pub use runtime::ShardInterceptor;
pub use runtime::ShardKeyResolver;
pub use runtime::ShardKeyed;
pub use runtime::TableFailure;
pub use runtime::TableSchemaManager;
pub use runtime::TenantOwned;
