// crates/metrics-shard-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for metrics-shard-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use metrics_shard_config::MetricsShardConfig;

/// Parses a TOML string into a `MetricsShardConfig` for tests.
pub fn config_from_toml(toml_str: &str) -> Result<MetricsShardConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a valid `SQLite` config with `dbs` shard files.
pub fn sqlite_config(dbs: u32) -> Result<MetricsShardConfig, toml::de::Error> {
    let mut text = format!(
        "[sharding]\nshard_db_count = {dbs}\n\n[master]\nbackend = \"sqlite\"\nurl = \
         \"master.db\"\n"
    );
    for index in 0 .. dbs {
        text.push_str(&format!("\n[[shards]]\nbackend = \"sqlite\"\nurl = \"shard-{index}.db\"\n"));
    }
    config_from_toml(&text)
}

/// Returns the canonical example config.
pub fn example_config() -> Result<MetricsShardConfig, toml::de::Error> {
    config_from_toml(&metrics_shard_config::config_toml_example())
}
