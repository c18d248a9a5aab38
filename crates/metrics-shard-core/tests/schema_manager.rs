// crates/metrics-shard-core/tests/schema_manager.rs
// ============================================================================
// Module: Table Schema Manager Tests
// Description: Lazy provisioning against the in-memory backend.
// Purpose: Validate idempotence, adoption, failure isolation, and readiness.
// Dependencies: metrics-shard-core
// ============================================================================

//! ## Overview
//! Provisioning runs against [`InMemoryShardTableBackend`], whose counters
//! expose how many DDL statements and record writes actually happened.

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

use std::sync::Arc;
use std::thread;

use metrics_shard_core::DbIndex;
use metrics_shard_core::InMemoryShardTableBackend;
use metrics_shard_core::ProvisionPath;
use metrics_shard_core::SchemaError;
use metrics_shard_core::ShardLayout;
use metrics_shard_core::TableSchemaManager;
use metrics_shard_core::TemplateError;
use metrics_shard_core::TemplateSource;
use metrics_shard_core::TemplateTable;
use metrics_shard_core::TenantId;

type TestResult = Result<(), String>;

fn manager(
    dbs: u32,
    tables: u32,
    second_level: bool,
) -> Result<(TableSchemaManager, InMemoryShardTableBackend), String> {
    let layout = ShardLayout::new(dbs, tables, second_level).map_err(|err| err.to_string())?;
    let backend = InMemoryShardTableBackend::new();
    let manager = TableSchemaManager::new(layout, Arc::new(backend.clone()));
    manager.initialize(&TemplateSource::Bundled).map_err(|err| err.to_string())?;
    Ok((manager, backend))
}

fn exec_sample_names(records: &[metrics_shard_core::ShardTableRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| record.table_name.clone())
        .filter(|name| name.starts_with("exec_sample-"))
        .collect()
}

#[test]
fn second_level_creates_eight_exec_sample_tables() -> TestResult {
    let (manager, backend) = manager(4, 8, true)?;
    let tenant = TenantId::new(101);
    let report = manager.check_and_create(tenant).map_err(|err| err.to_string())?;

    assert_eq!(report.path, ProvisionPath::Provisioned);
    assert_eq!(report.db_index.get(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(report.created.len(), TemplateTable::ALL.len() * 8);

    let expected: Vec<String> = (0 .. 8).map(|index| format!("exec_sample-101-{index}")).collect();
    assert_eq!(exec_sample_names(&backend.records()), expected);
    for name in &expected {
        assert!(backend.has_table(DbIndex::from_raw(1).ok_or("index")?, name));
        assert!(manager.registry_contains(name).map_err(|err| err.to_string())?);
    }
    Ok(())
}

#[test]
fn disabled_second_level_creates_one_table_per_template() -> TestResult {
    let (manager, backend) = manager(4, 8, false)?;
    let report = manager.check_and_create(TenantId::new(101)).map_err(|err| err.to_string())?;
    assert_eq!(report.created.len(), TemplateTable::ALL.len());
    assert_eq!(exec_sample_names(&backend.records()), vec!["exec_sample-101".to_string()]);
    assert!(report.created.contains(&"jvm_service_usage-101".to_string()));
    Ok(())
}

#[test]
fn check_and_create_is_idempotent() -> TestResult {
    let (manager, backend) = manager(2, 4, true)?;
    let tenant = TenantId::new(8);
    manager.check_and_create(tenant).map_err(|err| err.to_string())?;
    let ddl = backend.ddl_executions();
    let writes = backend.record_writes();
    assert_eq!(ddl, TemplateTable::ALL.len() * 4);
    assert_eq!(writes, ddl);

    let second = manager.check_and_create(tenant).map_err(|err| err.to_string())?;
    assert_eq!(second.path, ProvisionPath::FastPath);
    assert!(second.created.is_empty());
    assert_eq!(backend.ddl_executions(), ddl);
    assert_eq!(backend.record_writes(), writes);
    Ok(())
}

#[test]
fn records_from_other_instances_are_reloaded_not_recreated() -> TestResult {
    let layout = ShardLayout::new(2, 1, false).map_err(|err| err.to_string())?;
    let backend = InMemoryShardTableBackend::new();
    let first = TableSchemaManager::new(layout, Arc::new(backend.clone()));
    let second = TableSchemaManager::new(layout, Arc::new(backend.clone()));
    first.initialize(&TemplateSource::Bundled).map_err(|err| err.to_string())?;
    second.initialize(&TemplateSource::Bundled).map_err(|err| err.to_string())?;

    let tenant = TenantId::new(3);
    first.check_and_create(tenant).map_err(|err| err.to_string())?;
    let ddl = backend.ddl_executions();

    let report = second.check_and_create(tenant).map_err(|err| err.to_string())?;
    assert_eq!(report.path, ProvisionPath::Reloaded);
    assert_eq!(backend.ddl_executions(), ddl);
    Ok(())
}

#[test]
fn initialize_loads_existing_records_into_registry() -> TestResult {
    let layout = ShardLayout::new(2, 1, false).map_err(|err| err.to_string())?;
    let backend = InMemoryShardTableBackend::new();
    let db = DbIndex::from_raw(1).ok_or("index")?;
    backend.insert_record(db, "node_usage-5", TenantId::new(5));
    let manager = TableSchemaManager::new(layout, Arc::new(backend.clone()));
    manager.initialize(&TemplateSource::Bundled).map_err(|err| err.to_string())?;
    assert_eq!(manager.registered_tables().map_err(|err| err.to_string())?, vec![
        "node_usage-5".to_string()
    ]);

    let report = manager.check_and_create(TenantId::new(5)).map_err(|err| err.to_string())?;
    assert_eq!(report.created.len(), TemplateTable::ALL.len() - 1);
    assert!(!report.created.contains(&"node_usage-5".to_string()));
    Ok(())
}

#[test]
fn existing_physical_table_without_record_is_adopted() -> TestResult {
    let (manager, backend) = manager(1, 1, false)?;
    backend.insert_physical_table(DbIndex::ZERO, "disk_usage-4");
    let report = manager.check_and_create(TenantId::new(4)).map_err(|err| err.to_string())?;
    assert_eq!(report.adopted, vec!["disk_usage-4".to_string()]);
    assert!(report.failed.is_empty());
    assert!(manager.registry_contains("disk_usage-4").map_err(|err| err.to_string())?);
    assert!(backend.records().iter().any(|record| record.table_name == "disk_usage-4"));
    Ok(())
}

#[test]
fn single_table_failure_does_not_stop_the_rest() -> TestResult {
    let (manager, backend) = manager(1, 1, false)?;
    backend.fail_table("exec_sample-12");
    let tenant = TenantId::new(12);
    let report = manager.check_and_create(tenant).map_err(|err| err.to_string())?;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].table_name, "exec_sample-12");
    assert_eq!(report.created.len(), TemplateTable::ALL.len() - 1);
    assert!(!report.is_complete());
    assert!(!manager.registry_contains("exec_sample-12").map_err(|err| err.to_string())?);
    assert!(!backend.records().iter().any(|record| record.table_name == "exec_sample-12"));

    let retry = manager.check_and_create(tenant).map_err(|err| err.to_string())?;
    assert_eq!(retry.path, ProvisionPath::Provisioned);
    assert!(retry.created.is_empty());
    assert_eq!(retry.failed.len(), 1);
    Ok(())
}

#[test]
fn uninitialized_manager_skips_provisioning() -> TestResult {
    let layout = ShardLayout::new(1, 1, false).map_err(|err| err.to_string())?;
    let backend = InMemoryShardTableBackend::new();
    let manager = TableSchemaManager::new(layout, Arc::new(backend.clone()));
    assert!(!manager.is_ready());
    assert_eq!(manager.catalog().err(), Some(SchemaError::NotReady));
    let report = manager.check_and_create(TenantId::new(1)).map_err(|err| err.to_string())?;
    assert_eq!(report.path, ProvisionPath::Skipped);
    assert_eq!(backend.ddl_executions(), 0);
    Ok(())
}

#[test]
fn failed_template_load_leaves_manager_uninitialized() -> TestResult {
    let layout = ShardLayout::new(1, 1, false).map_err(|err| err.to_string())?;
    let manager = TableSchemaManager::new(layout, Arc::new(InMemoryShardTableBackend::new()));
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let err = manager
        .initialize(&TemplateSource::Directory(dir.path().to_path_buf()))
        .err()
        .ok_or("expected template error")?;
    assert!(matches!(err, SchemaError::Template(TemplateError::Missing(_))), "{err}");
    assert!(!manager.is_ready());
    Ok(())
}

#[test]
fn concurrent_callers_create_each_table_once() -> TestResult {
    let (manager, backend) = manager(2, 3, true)?;
    let manager = Arc::new(manager);
    let handles: Vec<_> = (0 .. 8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.check_and_create(TenantId::new(21)))
        })
        .collect();
    for handle in handles {
        let report = handle.join().map_err(|_| "thread panicked")?;
        assert!(report.map_err(|err| err.to_string())?.failed.is_empty());
    }
    assert_eq!(backend.ddl_executions(), TemplateTable::ALL.len() * 3);
    assert_eq!(backend.records().len(), TemplateTable::ALL.len() * 3);
    Ok(())
}

#[test]
fn tenants_on_the_same_shard_get_distinct_tables() -> TestResult {
    let (manager, backend) = manager(2, 1, false)?;
    manager.check_and_create(TenantId::new(2)).map_err(|err| err.to_string())?;
    manager.check_and_create(TenantId::new(4)).map_err(|err| err.to_string())?;
    let on_zero: Vec<_> =
        backend.records().into_iter().filter(|record| record.db_index == DbIndex::ZERO).collect();
    assert_eq!(on_zero.len(), TemplateTable::ALL.len() * 2);
    Ok(())
}
