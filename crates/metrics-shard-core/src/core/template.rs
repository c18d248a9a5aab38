// crates/metrics-shard-core/src/core/template.rs
// ============================================================================
// Module: Template Schemas
// Description: Logical metrics tables and their DDL templates.
// Purpose: Materialize per-tenant physical tables from parameterized DDL.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every sharded metrics table has a fixed logical name and a DDL template
//! that references that name as a quoted identifier. Rendering a template
//! substitutes every occurrence of the logical name with the physical table
//! name, so derived identifiers (index names) stay unique per physical table.
//!
//! Templates ship inside the binary and can be overridden from a directory
//! holding one `{logical_name}.sql` file per table. A catalog is only built
//! when every template it holds passes validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum template file size accepted from disk.
const MAX_TEMPLATE_BYTES: usize = 64 * 1024;

// ============================================================================
// SECTION: Template Tables
// ============================================================================

/// Logical metrics tables that are materialized per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateTable {
    /// Node CPU/memory usage samples.
    NodeUsage,
    /// Node disk usage samples.
    DiskUsage,
    /// Node network usage samples.
    NetworkUsage,
    /// Raw execution samples.
    ExecSample,
    /// Per-label execution summaries.
    ExecSampleSummary,
    /// Thread activity during execution.
    ExecSampleThread,
    /// Throughput per label over time.
    ExecSampleThroughput,
    /// Execution scores.
    ExecSampleScore,
    /// Error counts per label over time.
    ExecSampleError,
    /// Aggregated error causes.
    ExecSampleErrorCause,
    /// Captured request/response content.
    ExecSampleContent,
    /// JVM service resource usage samples.
    JvmServiceUsage,
}

impl TemplateTable {
    /// All logical tables in catalog order.
    pub const ALL: [Self; 12] = [
        Self::NodeUsage,
        Self::DiskUsage,
        Self::NetworkUsage,
        Self::ExecSample,
        Self::ExecSampleSummary,
        Self::ExecSampleThread,
        Self::ExecSampleThroughput,
        Self::ExecSampleScore,
        Self::ExecSampleError,
        Self::ExecSampleErrorCause,
        Self::ExecSampleContent,
        Self::JvmServiceUsage,
    ];

    /// Returns the logical table name used as the template placeholder.
    #[must_use]
    pub const fn logical_name(self) -> &'static str {
        match self {
            Self::NodeUsage => "node_usage",
            Self::DiskUsage => "disk_usage",
            Self::NetworkUsage => "network_usage",
            Self::ExecSample => "exec_sample",
            Self::ExecSampleSummary => "exec_sample_summary",
            Self::ExecSampleThread => "exec_sample_thread",
            Self::ExecSampleThroughput => "exec_sample_throughput",
            Self::ExecSampleScore => "exec_sample_score",
            Self::ExecSampleError => "exec_sample_error",
            Self::ExecSampleErrorCause => "exec_sample_error_cause",
            Self::ExecSampleContent => "exec_sample_content",
            Self::JvmServiceUsage => "jvm_service_usage",
        }
    }

    /// Returns the DDL bundled with the crate.
    #[must_use]
    pub const fn bundled_ddl(self) -> &'static str {
        match self {
            Self::NodeUsage => include_str!("../../templates/node_usage.sql"),
            Self::DiskUsage => include_str!("../../templates/disk_usage.sql"),
            Self::NetworkUsage => include_str!("../../templates/network_usage.sql"),
            Self::ExecSample => include_str!("../../templates/exec_sample.sql"),
            Self::ExecSampleSummary => include_str!("../../templates/exec_sample_summary.sql"),
            Self::ExecSampleThread => include_str!("../../templates/exec_sample_thread.sql"),
            Self::ExecSampleThroughput => {
                include_str!("../../templates/exec_sample_throughput.sql")
            }
            Self::ExecSampleScore => include_str!("../../templates/exec_sample_score.sql"),
            Self::ExecSampleError => include_str!("../../templates/exec_sample_error.sql"),
            Self::ExecSampleErrorCause => {
                include_str!("../../templates/exec_sample_error_cause.sql")
            }
            Self::ExecSampleContent => include_str!("../../templates/exec_sample_content.sql"),
            Self::JvmServiceUsage => include_str!("../../templates/jvm_service_usage.sql"),
        }
    }

    /// Returns the quoted placeholder a template must contain.
    fn quoted_placeholder(self) -> String {
        format!("\"{}\"", self.logical_name())
    }
}

impl fmt::Display for TemplateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.logical_name())
    }
}

impl FromStr for TemplateTable {
    type Err = TemplateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|table| table.logical_name() == value)
            .ok_or_else(|| TemplateError::Invalid(format!("unknown template table: {value}")))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Template loading and validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// Template resource not found.
    #[error("template missing: {0}")]
    Missing(String),
    /// Template resource could not be read.
    #[error("template io error: {0}")]
    Io(String),
    /// Template content is invalid.
    #[error("template invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Template Schema
// ============================================================================

/// Validated DDL template for one logical table.
///
/// # Invariants
/// - `ddl` is non-empty and contains the quoted logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSchema {
    /// Logical table the template materializes.
    table: TemplateTable,
    /// Raw DDL text with the logical name as placeholder.
    ddl: String,
}

impl TemplateSchema {
    /// Validates and wraps a DDL template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Invalid`] when the template is blank or does
    /// not reference its quoted logical name.
    pub fn new(table: TemplateTable, ddl: impl Into<String>) -> Result<Self, TemplateError> {
        let ddl = ddl.into();
        if ddl.trim().is_empty() {
            return Err(TemplateError::Invalid(format!("{table} template is empty")));
        }
        if !ddl.contains(&table.quoted_placeholder()) {
            return Err(TemplateError::Invalid(format!(
                "{table} template must reference {}",
                table.quoted_placeholder()
            )));
        }
        Ok(Self {
            table,
            ddl,
        })
    }

    /// Returns the logical table.
    #[must_use]
    pub const fn table(&self) -> TemplateTable {
        self.table
    }

    /// Returns the raw template text.
    #[must_use]
    pub fn ddl(&self) -> &str {
        &self.ddl
    }

    /// Renders the DDL for a physical table name.
    #[must_use]
    pub fn render(&self, physical_name: &str) -> String {
        self.ddl.replace(self.table.logical_name(), physical_name)
    }
}

// ============================================================================
// SECTION: Template Catalog
// ============================================================================

/// Where template DDL is loaded from at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TemplateSource {
    /// Templates compiled into the binary.
    #[default]
    Bundled,
    /// Directory with one `{logical_name}.sql` file per table.
    Directory(PathBuf),
}

impl TemplateSource {
    /// Loads a full catalog from this source.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] when any template is missing or invalid.
    pub fn load(&self) -> Result<TemplateCatalog, TemplateError> {
        match self {
            Self::Bundled => TemplateCatalog::bundled(),
            Self::Directory(dir) => TemplateCatalog::load_dir(dir),
        }
    }
}

/// Validated set of template schemas keyed by logical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateCatalog {
    /// Templates by logical table.
    schemas: BTreeMap<TemplateTable, TemplateSchema>,
}

impl TemplateCatalog {
    /// Builds the catalog from the templates bundled with the crate.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] when a bundled template fails validation.
    pub fn bundled() -> Result<Self, TemplateError> {
        let schemas = TemplateTable::ALL
            .into_iter()
            .map(|table| TemplateSchema::new(table, table.bundled_ddl()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_schemas(schemas)
    }

    /// Loads every logical table's template from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] when a file is missing, unreadable, oversized,
    /// or invalid.
    pub fn load_dir(dir: &Path) -> Result<Self, TemplateError> {
        let mut schemas = Vec::with_capacity(TemplateTable::ALL.len());
        for table in TemplateTable::ALL {
            let path = dir.join(format!("{}.sql", table.logical_name()));
            if !path.is_file() {
                return Err(TemplateError::Missing(path.display().to_string()));
            }
            let bytes = fs::read(&path)
                .map_err(|err| TemplateError::Io(format!("{}: {err}", path.display())))?;
            if bytes.len() > MAX_TEMPLATE_BYTES {
                return Err(TemplateError::Invalid(format!(
                    "{} exceeds size limit ({MAX_TEMPLATE_BYTES} bytes)",
                    path.display()
                )));
            }
            let ddl = String::from_utf8(bytes).map_err(|_| {
                TemplateError::Invalid(format!("{} must be utf-8", path.display()))
            })?;
            schemas.push(TemplateSchema::new(table, ddl)?);
        }
        Self::from_schemas(schemas)
    }

    /// Builds a catalog from explicit schemas.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Invalid`] when `schemas` is empty or repeats a
    /// logical table.
    pub fn from_schemas(
        schemas: impl IntoIterator<Item = TemplateSchema>,
    ) -> Result<Self, TemplateError> {
        let mut map = BTreeMap::new();
        for schema in schemas {
            let table = schema.table();
            if map.insert(table, schema).is_some() {
                return Err(TemplateError::Invalid(format!("duplicate template: {table}")));
            }
        }
        if map.is_empty() {
            return Err(TemplateError::Invalid("template catalog is empty".to_string()));
        }
        Ok(Self {
            schemas: map,
        })
    }

    /// Returns the template for a logical table.
    #[must_use]
    pub fn get(&self, table: TemplateTable) -> Option<&TemplateSchema> {
        self.schemas.get(&table)
    }

    /// Iterates over the templates in catalog order.
    pub fn schemas(&self) -> impl Iterator<Item = &TemplateSchema> {
        self.schemas.values()
    }

    /// Returns the number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true when the catalog has no templates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
