// crates/metrics-shard-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payloads.
// Purpose: Deterministic examples for docs and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `metrics-shard.toml`. The example must always pass
//! validation; a test in this crate enforces that.

/// Returns a canonical example `metrics-shard.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[sharding]
shard_db_count = 4
shard_table_count = 8
enable_second_level_table_sharding = true
# template_dir = "/etc/metrics-shard/templates"

[master]
backend = "postgres"
url = "postgres://metrics-master.internal:5432/metrics"
username = "metrics"
password = "change-me"

[[shards]]
backend = "postgres"
url = "postgres://metrics-0.internal:5432/metrics"
username = "metrics"
password = "change-me"

[[shards]]
backend = "postgres"
url = "postgres://metrics-1.internal:5432/metrics"
username = "metrics"
password = "change-me"

[[shards]]
backend = "postgres"
url = "postgres://metrics-2.internal:5432/metrics"
username = "metrics"
password = "change-me"

[[shards]]
backend = "postgres"
url = "postgres://metrics-3.internal:5432/metrics"
username = "metrics"
password = "change-me"

[pool]
max_pool_size = 16
min_idle = 2
max_lifetime_ms = 1800000
idle_timeout_ms = 600000
connection_timeout_ms = 30000
connect_timeout_ms = 5000
# Bounds each checkout validation round trip; 0 skips validation.
validation_timeout_ms = 5000
"#,
    )
}
