// crates/metrics-shard-core/src/core/mod.rs
// ============================================================================
// Module: Metrics Shard Core Types
// Description: Identifiers, shard model, layout math, and template schemas.
// Purpose: Provide the pure, I/O-free building blocks of shard routing.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Core types hold no connections and perform no I/O, with the single
//! exception of [`TemplateCatalog::load_dir`] reading template files at
//! startup.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod identifiers;
pub mod layout;
pub mod shard;
pub mod template;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::DbIndex;
pub use identifiers::TenantId;
pub use layout::LayoutError;
pub use layout::MAX_SHARD_DB_COUNT;
pub use layout::MAX_SHARD_TABLE_COUNT;
pub use layout::MIN_SHARD_DB_COUNT;
pub use layout::MIN_SHARD_TABLE_COUNT;
pub use layout::ShardLayout;
pub use shard::DEFAULT_SHARD_KEY;
pub use shard::MASTER_DATA_SOURCE_KEY;
pub use shard::NO_TABLE_INDEX;
pub use shard::Shard;
pub use shard::ShardTableRecord;
pub use shard::physical_table_name;
pub use shard::shard_data_source_key;
pub use template::TemplateCatalog;
pub use template::TemplateError;
pub use template::TemplateSchema;
pub use template::TemplateSource;
pub use template::TemplateTable;
