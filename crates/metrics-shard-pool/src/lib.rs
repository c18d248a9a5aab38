// crates/metrics-shard-pool/src/lib.rs
// ============================================================================
// Module: Metrics Shard Pool Library
// Description: Connection pools per shard and the routing datasource.
// Purpose: Hand out the pooled connection selected by the routing context.
// Dependencies: metrics-shard-{core, config}, r2d2, tracing
// ============================================================================

//! ## Overview
//! One r2d2 pool is built per physical database: the master plus one per
//! shard. [`RoutingDataSource`] sits in front of them and resolves every
//! checkout through [`metrics_shard_core::RoutingContext`]. The crate is
//! generic over the r2d2 connection manager; backends supply a
//! [`ManagerFactory`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod factory;
pub mod router;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use factory::ManagerFactory;
pub use factory::TracingErrorHandler;
pub use factory::build_pool;
pub use router::PoolStatus;
pub use router::RoutingDataSource;
pub use router::RoutingError;
