// crates/metrics-shard-config/src/config.rs
// ============================================================================
// Module: Metrics Shard Configuration
// Description: Configuration loading and validation for metrics sharding.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: metrics-shard-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Shard counts are range checked, the shard datasource list must match the
//! database count exactly, and every datasource must use the master's
//! backend so one router can hold all pools.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use metrics_shard_core::MAX_SHARD_DB_COUNT;
use metrics_shard_core::MAX_SHARD_TABLE_COUNT;
use metrics_shard_core::MIN_SHARD_DB_COUNT;
use metrics_shard_core::MIN_SHARD_TABLE_COUNT;
use metrics_shard_core::ShardLayout;
use metrics_shard_core::TemplateSource;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "metrics-shard.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "METRICS_SHARD_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a datasource URL.
pub(crate) const MAX_URL_LENGTH: usize = 4096;
/// Maximum connections per pool.
pub(crate) const MAX_POOL_SIZE: u32 = 1024;
/// Minimum pool checkout timeout in milliseconds.
pub(crate) const MIN_CONNECTION_TIMEOUT_MS: u64 = 250;
/// Maximum pool checkout timeout in milliseconds.
pub(crate) const MAX_CONNECTION_TIMEOUT_MS: u64 = 600_000;
/// Minimum non-zero connection lifetime in milliseconds.
pub(crate) const MIN_MAX_LIFETIME_MS: u64 = 30_000;
/// Minimum non-zero idle timeout in milliseconds.
pub(crate) const MIN_IDLE_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Metrics shard configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsShardConfig {
    /// Shard counts and template location.
    #[serde(default)]
    pub sharding: ShardingConfig,
    /// Datasource used when no shard is selected.
    pub master: DataSourceConfig,
    /// One datasource per shard database, indexed by db index.
    #[serde(default)]
    pub shards: Vec<DataSourceConfig>,
    /// Connection pool sizing shared by every datasource.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl MetricsShardConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sharding.validate()?;
        self.master.validate("master")?;
        let expected = usize::try_from(self.sharding.shard_db_count).unwrap_or(usize::MAX);
        if self.shards.len() != expected {
            return Err(ConfigError::Invalid(format!(
                "shards must list exactly shard_db_count ({expected}) datasources, found {}",
                self.shards.len()
            )));
        }
        for (index, shard) in self.shards.iter().enumerate() {
            let field = format!("shards[{index}]");
            shard.validate(&field)?;
            if shard.backend != self.master.backend {
                return Err(ConfigError::Invalid(format!(
                    "{field}.backend must match master.backend ({})",
                    self.master.backend
                )));
            }
        }
        self.pool.validate()?;
        Ok(())
    }

    /// Returns the validated shard layout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a count is out of range.
    pub fn layout(&self) -> Result<ShardLayout, ConfigError> {
        self.sharding.layout()
    }

    /// Returns where template DDL is loaded from.
    #[must_use]
    pub fn template_source(&self) -> TemplateSource {
        self.sharding
            .template_dir
            .as_ref()
            .map_or(TemplateSource::Bundled, |dir| TemplateSource::Directory(dir.clone()))
    }

    /// Returns the backend every datasource uses.
    #[must_use]
    pub const fn backend(&self) -> DatabaseBackend {
        self.master.backend
    }
}

/// Shard counts and template location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingConfig {
    /// Number of physical shard databases.
    #[serde(default = "default_shard_count")]
    pub shard_db_count: u32,
    /// Number of secondary tables per template.
    #[serde(default = "default_shard_count")]
    pub shard_table_count: u32,
    /// Whether second-level table sharding is enabled.
    #[serde(default)]
    pub enable_second_level_table_sharding: bool,
    /// Optional directory overriding the bundled templates.
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            shard_db_count: default_shard_count(),
            shard_table_count: default_shard_count(),
            enable_second_level_table_sharding: false,
            template_dir: None,
        }
    }
}

impl ShardingConfig {
    /// Validates shard counts and the template directory.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SHARD_DB_COUNT ..= MAX_SHARD_DB_COUNT).contains(&self.shard_db_count) {
            return Err(ConfigError::Invalid(format!(
                "sharding.shard_db_count must be between {MIN_SHARD_DB_COUNT} and \
                 {MAX_SHARD_DB_COUNT}"
            )));
        }
        if !(MIN_SHARD_TABLE_COUNT ..= MAX_SHARD_TABLE_COUNT).contains(&self.shard_table_count) {
            return Err(ConfigError::Invalid(format!(
                "sharding.shard_table_count must be between {MIN_SHARD_TABLE_COUNT} and \
                 {MAX_SHARD_TABLE_COUNT}"
            )));
        }
        if let Some(dir) = &self.template_dir {
            validate_path_string("sharding.template_dir", &dir.to_string_lossy())?;
        }
        Ok(())
    }

    /// Builds the shard layout.
    fn layout(&self) -> Result<ShardLayout, ConfigError> {
        ShardLayout::new(
            self.shard_db_count,
            self.shard_table_count,
            self.enable_second_level_table_sharding,
        )
        .map_err(|err| ConfigError::Invalid(err.to_string()))
    }
}

/// Database engine behind a datasource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    /// `PostgreSQL` via `r2d2_postgres`.
    #[default]
    Postgres,
    /// `SQLite` database files via `rusqlite`.
    Sqlite,
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => f.write_str("postgres"),
            Self::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Connection settings for one physical database.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Database engine.
    #[serde(default)]
    pub backend: DatabaseBackend,
    /// Connection URL (`PostgreSQL`) or database file path (`SQLite`).
    pub url: String,
    /// Optional user name overriding the URL.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password overriding the URL.
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for DataSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceConfig")
            .field("backend", &self.backend)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl DataSourceConfig {
    /// Validates a datasource entry.
    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid(format!("{field}.url must be non-empty")));
        }
        if url.len() > MAX_URL_LENGTH {
            return Err(ConfigError::Invalid(format!("{field}.url exceeds max length")));
        }
        match self.backend {
            DatabaseBackend::Postgres => {
                if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                    return Err(ConfigError::Invalid(format!(
                        "{field}.url must start with postgres:// or postgresql://"
                    )));
                }
            }
            DatabaseBackend::Sqlite => {
                validate_path_string(&format!("{field}.url"), url)?;
                if self.username.is_some() || self.password.is_some() {
                    return Err(ConfigError::Invalid(format!(
                        "{field} sqlite datasource must not set credentials"
                    )));
                }
            }
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::Invalid(format!("{field}.password requires username")));
        }
        Ok(())
    }
}

/// Connection pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum connections per pool.
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
    /// Minimum idle connections kept per pool.
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,
    /// Maximum connection lifetime in milliseconds (0 disables).
    #[serde(default = "default_max_lifetime_ms")]
    pub max_lifetime_ms: u64,
    /// Idle connection timeout in milliseconds (0 disables).
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Maximum wait for a pooled connection in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Timeout for establishing a new physical connection in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Checkout validation bound in milliseconds; 0 turns validation off.
    ///
    /// Postgres pools abandon the validation round trip after this long.
    /// `SQLite` validation is a local query, so there the value only acts as
    /// the on/off switch.
    #[serde(default = "default_validation_timeout_ms")]
    pub validation_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: default_max_pool_size(),
            min_idle: default_min_idle(),
            max_lifetime_ms: default_max_lifetime_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            validation_timeout_ms: default_validation_timeout_ms(),
        }
    }
}

impl PoolConfig {
    /// Validates pool sizing and timeouts.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_pool_size must be greater than zero".to_string(),
            ));
        }
        if self.max_pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "pool.max_pool_size must be at most {MAX_POOL_SIZE}"
            )));
        }
        if self.min_idle > self.max_pool_size {
            return Err(ConfigError::Invalid(
                "pool.min_idle must not exceed pool.max_pool_size".to_string(),
            ));
        }
        if !(MIN_CONNECTION_TIMEOUT_MS ..= MAX_CONNECTION_TIMEOUT_MS)
            .contains(&self.connection_timeout_ms)
        {
            return Err(ConfigError::Invalid(format!(
                "pool.connection_timeout_ms must be between {MIN_CONNECTION_TIMEOUT_MS} and \
                 {MAX_CONNECTION_TIMEOUT_MS}"
            )));
        }
        if self.connect_timeout_ms == 0 || self.connect_timeout_ms > MAX_CONNECTION_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "pool.connect_timeout_ms must be between 1 and {MAX_CONNECTION_TIMEOUT_MS}"
            )));
        }
        if self.validation_timeout_ms > self.connection_timeout_ms {
            return Err(ConfigError::Invalid(
                "pool.validation_timeout_ms must not exceed pool.connection_timeout_ms".to_string(),
            ));
        }
        if self.max_lifetime_ms != 0 && self.max_lifetime_ms < MIN_MAX_LIFETIME_MS {
            return Err(ConfigError::Invalid(format!(
                "pool.max_lifetime_ms must be 0 or at least {MIN_MAX_LIFETIME_MS}"
            )));
        }
        if self.idle_timeout_ms != 0 && self.idle_timeout_ms < MIN_IDLE_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "pool.idle_timeout_ms must be 0 or at least {MIN_IDLE_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }

    /// Returns the maximum connection lifetime, if enabled.
    #[must_use]
    pub const fn max_lifetime(&self) -> Option<Duration> {
        optional_millis(self.max_lifetime_ms)
    }

    /// Returns the idle timeout, if enabled.
    #[must_use]
    pub const fn idle_timeout(&self) -> Option<Duration> {
        optional_millis(self.idle_timeout_ms)
    }

    /// Returns the pool checkout timeout.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Returns the physical connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns true when connections are validated on checkout.
    #[must_use]
    pub const fn validate_on_checkout(&self) -> bool {
        self.validation_timeout_ms > 0
    }

    /// Returns the checkout validation bound.
    #[must_use]
    pub const fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }
}

/// Maps zero to `None`.
const fn optional_millis(value: u64) -> Option<Duration> {
    if value == 0 { None } else { Some(Duration::from_millis(value)) }
}

/// Default shard/table count.
const fn default_shard_count() -> u32 {
    1
}

/// Default maximum pool size.
const fn default_max_pool_size() -> u32 {
    10
}

/// Default minimum idle connections.
const fn default_min_idle() -> u32 {
    1
}

/// Default connection lifetime (30 minutes).
const fn default_max_lifetime_ms() -> u64 {
    1_800_000
}

/// Default idle timeout (10 minutes).
const fn default_idle_timeout_ms() -> u64 {
    600_000
}

/// Default pool checkout timeout.
const fn default_connection_timeout_ms() -> u64 {
    30_000
}

/// Default physical connect timeout.
const fn default_connect_timeout_ms() -> u64 {
    5_000
}

/// Default validation timeout.
const fn default_validation_timeout_ms() -> u64 {
    5_000
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    #[test]
    fn validate_path_string_rejects_whitespace_only() {
        assert!(validate_path_string("sharding.template_dir", "   ").is_err());
    }

    #[test]
    fn validate_path_rejects_long_component() {
        let long = "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1);
        let err = validate_path(Path::new(&long)).unwrap_err();
        assert!(err.to_string().contains("component too long"));
    }

    #[test]
    fn explicit_path_wins_over_environment() {
        let resolved = resolve_path(Some(Path::new("custom.toml"))).unwrap();
        assert_eq!(resolved, PathBuf::from("custom.toml"));
    }

    #[test]
    fn zero_timeouts_disable_optional_settings() {
        let pool = PoolConfig {
            max_lifetime_ms: 0,
            idle_timeout_ms: 0,
            validation_timeout_ms: 0,
            ..PoolConfig::default()
        };
        assert_eq!(pool.max_lifetime(), None);
        assert_eq!(pool.idle_timeout(), None);
        assert!(!pool.validate_on_checkout());
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn validation_timeout_enables_and_bounds_checkout_validation() {
        let pool = PoolConfig {
            validation_timeout_ms: 750,
            ..PoolConfig::default()
        };
        assert!(pool.validate_on_checkout());
        assert_eq!(pool.validation_timeout(), Duration::from_millis(750));
    }
}
