// crates/metrics-shard-config/src/lib.rs
// ============================================================================
// Module: Metrics Shard Config Library
// Description: Canonical config model and validation for metrics sharding.
// Purpose: Single source of truth for metrics-shard.toml semantics.
// Dependencies: metrics-shard-core, serde, toml
// ============================================================================

//! ## Overview
//! `metrics-shard-config` defines the shard counts, the master and per-shard
//! datasources, and the connection pool sizing. Validation is fail-closed:
//! a process with an invalid configuration must refuse to start.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
