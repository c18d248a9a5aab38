// crates/metrics-shard-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Shard Table Backend Tests
// Description: Provisioning against real SQLite shard files.
// Purpose: Verify registry persistence, adoption, and per-table atomicity.
// Dependencies: metrics-shard-{core, config, pool, store-sqlite}, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Builds a routing datasource over temporary `SQLite` files and drives the
//! table schema manager through it end to end.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use metrics_shard_config::MetricsShardConfig;
use metrics_shard_core::BackendError;
use metrics_shard_core::CreateTableRequest;
use metrics_shard_core::DbIndex;
use metrics_shard_core::ProvisionPath;
use metrics_shard_core::ShardTableBackend;
use metrics_shard_core::TableCreation;
use metrics_shard_core::TableSchemaManager;
use metrics_shard_core::TemplateTable;
use metrics_shard_core::TenantId;
use metrics_shard_pool::ManagerFactory;
use metrics_shard_pool::RoutingDataSource;
use metrics_shard_pool::RoutingError;
use metrics_shard_store_sqlite::SqliteManagerFactory;
use metrics_shard_store_sqlite::SqliteShardTableBackend;
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a `SQLite` config with shard files under `dir`.
fn config(dir: &Path, dbs: u32, tables: u32, template_dir: Option<&Path>) -> MetricsShardConfig {
    let mut text = format!(
        "[sharding]\nshard_db_count = {dbs}\nshard_table_count = {tables}\n\
         enable_second_level_table_sharding = {}\n",
        tables > 1
    );
    if let Some(template_dir) = template_dir {
        writeln!(text, "template_dir = '{}'", template_dir.display()).unwrap();
    }
    writeln!(
        text,
        "\n[master]\nbackend = \"sqlite\"\nurl = '{}'",
        dir.join("master.db").display()
    )
    .unwrap();
    for index in 0 .. dbs {
        writeln!(
            text,
            "\n[[shards]]\nbackend = \"sqlite\"\nurl = '{}'",
            shard_path(dir, index).display()
        )
        .unwrap();
    }
    writeln!(text, "\n[pool]\nmax_pool_size = 4\nconnection_timeout_ms = 5000").unwrap();
    let config: MetricsShardConfig = toml::from_str(&text).unwrap();
    config.validate().unwrap();
    config
}

/// Returns the file of shard `index`.
fn shard_path(dir: &Path, index: u32) -> std::path::PathBuf {
    dir.join(format!("shard-{index}.db"))
}

/// Builds the backend for `config`.
fn backend(config: &MetricsShardConfig) -> SqliteShardTableBackend {
    let router = RoutingDataSource::from_config(config, &SqliteManagerFactory).unwrap();
    SqliteShardTableBackend::new(Arc::new(router)).unwrap()
}

/// Builds and initializes a manager for `config`.
fn manager(config: &MetricsShardConfig) -> TableSchemaManager {
    let layout = config.layout().unwrap();
    let manager = TableSchemaManager::new(layout, Arc::new(backend(config)));
    manager.initialize(&config.template_source()).unwrap();
    manager
}

/// Lists user tables in a shard file, excluding the registry.
fn physical_tables(path: &Path) -> Vec<String> {
    let connection = Connection::open(path).unwrap();
    let mut stmt = connection
        .prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             AND name <> 'shard_tables' ORDER BY name",
        )
        .unwrap();
    stmt.query_map([], |row| row.get(0)).unwrap().collect::<Result<_, _>>().unwrap()
}

/// Counts registry rows in a shard file.
fn registry_rows(path: &Path) -> i64 {
    let connection = Connection::open(path).unwrap();
    connection.query_row("SELECT COUNT(*) FROM shard_tables", [], |row| row.get(0)).unwrap()
}

// ============================================================================
// SECTION: Registry
// ============================================================================

#[test]
fn construction_creates_registry_on_every_shard() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 3, 1, None);
    let backend = backend(&config);
    assert!(backend.load_all().unwrap().is_empty());
    for index in 0 .. 3 {
        assert_eq!(registry_rows(&shard_path(dir.path(), index)), 0);
    }
}

#[test]
fn load_tenant_rejects_unknown_shard() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 2, 1, None);
    let backend = backend(&config);
    let unknown = DbIndex::from_raw(5).unwrap();
    let err = backend.load_tenant(unknown, TenantId::new(5)).unwrap_err();
    assert_eq!(err, BackendError::UnknownShard(unknown));
}

// ============================================================================
// SECTION: Provisioning
// ============================================================================

#[test]
fn provisioning_creates_every_table_on_the_tenant_shard() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 2, 1, None);
    let manager = manager(&config);

    let report = manager.check_and_create(TenantId::new(5)).unwrap();
    assert_eq!(report.path, ProvisionPath::Provisioned);
    assert_eq!(report.created.len(), TemplateTable::ALL.len());
    assert!(report.is_complete());

    let tables = physical_tables(&shard_path(dir.path(), 1));
    assert_eq!(tables.len(), TemplateTable::ALL.len());
    assert!(tables.contains(&"exec_sample-5".to_string()));
    assert!(physical_tables(&shard_path(dir.path(), 0)).is_empty());
    assert_eq!(registry_rows(&shard_path(dir.path(), 1)), 12);

    let again = manager.check_and_create(TenantId::new(5)).unwrap();
    assert_eq!(again.path, ProvisionPath::FastPath);
    assert_eq!(registry_rows(&shard_path(dir.path(), 1)), 12);
}

#[test]
fn second_level_sharding_creates_one_table_per_index() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 1, 3, None);
    let manager = manager(&config);

    let report = manager.check_and_create(TenantId::new(8)).unwrap();
    assert_eq!(report.created.len(), TemplateTable::ALL.len() * 3);
    let tables = physical_tables(&shard_path(dir.path(), 0));
    for index in 0 .. 3 {
        assert!(tables.contains(&format!("node_usage-8-{index}")));
    }
}

#[test]
fn restarted_process_loads_records_and_skips_creation() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 2, 1, None);
    manager(&config).check_and_create(TenantId::new(3)).unwrap();

    let restarted = manager(&config);
    assert!(restarted.registry_contains("disk_usage-3").unwrap());
    let report = restarted.check_and_create(TenantId::new(3)).unwrap();
    assert_eq!(report.path, ProvisionPath::FastPath);
}

#[test]
fn peer_created_tables_are_found_on_reload() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 2, 1, None);
    let stale = manager(&config);
    let peer = manager(&config);

    peer.check_and_create(TenantId::new(4)).unwrap();
    let report = stale.check_and_create(TenantId::new(4)).unwrap();
    assert_eq!(report.path, ProvisionPath::Reloaded);
    assert_eq!(registry_rows(&shard_path(dir.path(), 0)), 12);
}

#[test]
fn existing_physical_table_is_adopted() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 1, 1, None);
    let backend = backend(&config);
    let connection = Connection::open(shard_path(dir.path(), 0)).unwrap();
    connection.execute_batch("CREATE TABLE \"node_usage-9\" (id INTEGER);").unwrap();

    let ddl = TemplateTable::NodeUsage.bundled_ddl().replace("node_usage", "node_usage-9");
    let request = CreateTableRequest {
        db_index: DbIndex::ZERO,
        tenant_id: TenantId::new(9),
        table_name: "node_usage-9",
        ddl: &ddl,
    };
    let creation = backend.create_table(&request).unwrap();
    assert!(matches!(creation, TableCreation::AlreadyExists(_)));
    assert_eq!(creation.record().tenant_id, TenantId::new(9));

    let repeat = backend.create_table(&request).unwrap();
    assert_eq!(repeat.record().id, creation.record().id);
    assert_eq!(registry_rows(&shard_path(dir.path(), 0)), 1);
}

#[test]
fn failing_template_leaves_no_record_and_others_succeed() {
    let dir = TempDir::new().unwrap();
    let templates = dir.path().join("templates");
    std::fs::create_dir_all(&templates).unwrap();
    for table in TemplateTable::ALL {
        let ddl = if table == TemplateTable::ExecSampleScore {
            "CREATE TABLE \"exec_sample_score\" (\"id\" BIGINT NOT NULL PRIMARY KEY,".to_string()
        } else {
            table.bundled_ddl().to_string()
        };
        std::fs::write(templates.join(format!("{}.sql", table.logical_name())), ddl).unwrap();
    }
    let config = config(dir.path(), 1, 1, Some(&templates));
    let manager = manager(&config);

    let report = manager.check_and_create(TenantId::new(2)).unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].table_name, "exec_sample_score-2");
    assert_eq!(report.created.len(), TemplateTable::ALL.len() - 1);
    assert!(!manager.registry_contains("exec_sample_score-2").unwrap());

    let shard = shard_path(dir.path(), 0);
    assert!(!physical_tables(&shard).contains(&"exec_sample_score-2".to_string()));
    assert_eq!(registry_rows(&shard), 11);
}

// ============================================================================
// SECTION: Factory
// ============================================================================

#[test]
fn factory_rejects_postgres_datasources() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), 1, 1, None);
    config.master.backend = metrics_shard_config::DatabaseBackend::Postgres;
    let err = SqliteManagerFactory.manager(&config.master, &config.pool).unwrap_err();
    assert!(matches!(err, RoutingError::Config(_)));
}

#[test]
fn routed_checkout_reaches_the_tenant_shard_file() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 2, 1, None);
    let router = RoutingDataSource::from_config(&config, &SqliteManagerFactory).unwrap();
    let shard = router.layout().shard_for(TenantId::new(7), None);
    let _scope = metrics_shard_core::RoutingContext::enter(Some(shard));
    let connection = router.get().unwrap();
    let file: String = connection
        .query_row("SELECT file FROM pragma_database_list WHERE name = 'main'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert!(file.ends_with("shard-1.db"));
}
