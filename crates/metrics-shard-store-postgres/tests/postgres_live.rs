// crates/metrics-shard-store-postgres/tests/postgres_live.rs
// ============================================================================
// Module: Postgres Live Store Tests
// Description: Shard table registry tests against a real Postgres server.
// Purpose: Verify create, adoption, and concurrent-create handling end to end.
// Dependencies: metrics-shard-{core, config, pool, store-postgres}, postgres
// ============================================================================

//! ## Overview
//! These tests run only when `METRICS_SHARD_PG_URL` names a reachable
//! database; otherwise each test returns early. The master and the single
//! shard both point at that database. Every test works on tenants derived
//! from the clock and process id and drops its tables when done.

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

use std::env;
use std::process;
use std::sync::Arc;
use std::sync::Barrier;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use metrics_shard_config::MetricsShardConfig;
use metrics_shard_core::CreateTableRequest;
use metrics_shard_core::DbIndex;
use metrics_shard_core::ProvisionPath;
use metrics_shard_core::ShardTableBackend;
use metrics_shard_core::TableCreation;
use metrics_shard_core::TableSchemaManager;
use metrics_shard_core::TemplateSchema;
use metrics_shard_core::TemplateTable;
use metrics_shard_core::TenantId;
use metrics_shard_core::physical_table_name;
use metrics_shard_pool::RoutingDataSource;
use metrics_shard_store_postgres::PostgresManagerFactory;
use metrics_shard_store_postgres::PostgresShardTableBackend;
use postgres::Client;
use postgres::NoTls;

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// Environment variable naming the live test database.
const PG_URL_ENV: &str = "METRICS_SHARD_PG_URL";

/// Rounds of simultaneous creates in the race test.
const RACE_ROUNDS: usize = 20;

/// Live database shared by the master and the only shard.
struct LiveDatabase {
    /// Connection URL.
    url: String,
    /// Tables to drop when the test ends.
    created: Vec<String>,
    /// Tenants whose registry rows are removed when the test ends.
    tenants: Vec<TenantId>,
}

impl LiveDatabase {
    /// Returns the fixture, or `None` when no live database is configured.
    fn connect() -> Option<Self> {
        match env::var(PG_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Some(Self {
                url,
                created: Vec::new(),
                tenants: Vec::new(),
            }),
            _ => {
                eprintln!("{PG_URL_ENV} not set; skipping live postgres test");
                None
            }
        }
    }

    /// Parses a one-shard config whose datasources all use this database.
    fn config(&self) -> MetricsShardConfig {
        let config: MetricsShardConfig = toml::from_str(&format!(
            "[sharding]\nshard_db_count = 1\n\n[master]\nurl = '{url}'\n\n[[shards]]\nurl = \
             '{url}'\n",
            url = self.url
        ))
        .unwrap();
        config.validate().unwrap();
        config
    }

    /// Builds an independent backend with its own pools.
    fn backend(&self) -> PostgresShardTableBackend {
        let router = RoutingDataSource::from_config(&self.config(), &PostgresManagerFactory)
            .expect("postgres router");
        PostgresShardTableBackend::new(Arc::new(router)).expect("postgres backend")
    }

    /// Opens a direct client for setup and inspection.
    fn client(&self) -> Client {
        Client::connect(&self.url, NoTls).expect("postgres client")
    }

    /// Returns a tenant unused by earlier runs and tracks it for cleanup.
    fn tenant(&mut self) -> TenantId {
        static NEXT: AtomicI64 = AtomicI64::new(0);
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis();
        let millis = i64::try_from(millis % 1_000_000_000).unwrap();
        let pid = i64::from(process::id() % 10);
        let seq = NEXT.fetch_add(1, Ordering::Relaxed) % 100;
        let tenant = TenantId::new(1 + millis * 1_000 + pid * 100 + seq);
        self.tenants.push(tenant);
        tenant
    }

    /// Returns the `exec_sample` name for `tenant` and tracks it for cleanup.
    fn exec_sample_table(&mut self, tenant: TenantId) -> String {
        let name = physical_table_name(TemplateTable::ExecSample, tenant, None);
        self.created.push(name.clone());
        name
    }
}

impl Drop for LiveDatabase {
    fn drop(&mut self) {
        let Ok(mut client) = Client::connect(&self.url, NoTls) else {
            return;
        };
        for table in &self.created {
            let _ = client.batch_execute(&format!("DROP TABLE IF EXISTS \"{table}\""));
        }
        for tenant in &self.tenants {
            let _ =
                client.execute("DELETE FROM shard_tables WHERE tenant_id = $1", &[&tenant.get()]);
        }
    }
}

/// Renders the bundled `exec_sample` DDL for `table_name`.
fn exec_sample_ddl(table_name: &str) -> String {
    TemplateSchema::new(TemplateTable::ExecSample, TemplateTable::ExecSample.bundled_ddl())
        .unwrap()
        .render(table_name)
}

/// Returns true when `table_name` exists in the connected schema.
fn physical_table_exists(client: &mut Client, table_name: &str) -> bool {
    client
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables
             WHERE table_schema = current_schema() AND table_name = $1)",
            &[&table_name],
        )
        .unwrap()
        .get(0)
}

// ============================================================================
// SECTION: Backend
// ============================================================================

#[test]
fn live_fresh_table_is_created_and_recorded() {
    let Some(mut db) = LiveDatabase::connect() else {
        return;
    };
    let backend = db.backend();
    let tenant = db.tenant();
    let table = db.exec_sample_table(tenant);
    let ddl = exec_sample_ddl(&table);
    let request = CreateTableRequest {
        db_index: DbIndex::ZERO,
        tenant_id: tenant,
        table_name: &table,
        ddl: &ddl,
    };

    let creation = backend.create_table(&request).unwrap();
    assert!(matches!(creation, TableCreation::Created(_)), "unexpected: {creation:?}");
    assert_eq!(creation.record().table_name, table);
    assert_eq!(creation.record().tenant_id, tenant);
    assert!(physical_table_exists(&mut db.client(), &table));

    let repeat = backend.create_table(&request).unwrap();
    assert!(matches!(repeat, TableCreation::AlreadyExists(_)), "unexpected: {repeat:?}");
    assert_eq!(repeat.record().id, creation.record().id);

    let rows = backend.load_tenant(DbIndex::ZERO, tenant).unwrap();
    assert_eq!(rows, vec![creation.record().clone()]);
    assert!(backend.load_all().unwrap().contains(creation.record()));
}

#[test]
fn live_existing_table_without_record_is_adopted() {
    let Some(mut db) = LiveDatabase::connect() else {
        return;
    };
    let backend = db.backend();
    let tenant = db.tenant();
    let table = db.exec_sample_table(tenant);
    let ddl = exec_sample_ddl(&table);
    db.client().batch_execute(&ddl).unwrap();
    assert!(backend.load_tenant(DbIndex::ZERO, tenant).unwrap().is_empty());

    let request = CreateTableRequest {
        db_index: DbIndex::ZERO,
        tenant_id: tenant,
        table_name: &table,
        ddl: &ddl,
    };
    let creation = backend.create_table(&request).unwrap();
    assert!(matches!(creation, TableCreation::AlreadyExists(_)), "unexpected: {creation:?}");
    assert_eq!(creation.record().tenant_id, tenant);

    let rows = backend.load_tenant(DbIndex::ZERO, tenant).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].table_name, table);
}

#[test]
fn live_simultaneous_creates_from_two_instances_both_succeed() {
    let Some(mut db) = LiveDatabase::connect() else {
        return;
    };
    let first = db.backend();
    let second = db.backend();

    for _ in 0 .. RACE_ROUNDS {
        let tenant = db.tenant();
        let table = db.exec_sample_table(tenant);
        let ddl = exec_sample_ddl(&table);
        let request = CreateTableRequest {
            db_index: DbIndex::ZERO,
            tenant_id: tenant,
            table_name: &table,
            ddl: &ddl,
        };
        let barrier = Barrier::new(2);
        let (left, right) = thread::scope(|scope| {
            let left = scope.spawn(|| {
                barrier.wait();
                first.create_table(&request)
            });
            let right = scope.spawn(|| {
                barrier.wait();
                second.create_table(&request)
            });
            (left.join().unwrap(), right.join().unwrap())
        });

        let left = left.unwrap_or_else(|err| panic!("{table}: {err}"));
        let right = right.unwrap_or_else(|err| panic!("{table}: {err}"));
        let created = [&left, &right]
            .iter()
            .filter(|creation| matches!(creation, TableCreation::Created(_)))
            .count();
        assert_eq!(created, 1, "{table}: {left:?} / {right:?}");
        assert_eq!(left.record(), right.record());
        assert_eq!(first.load_tenant(DbIndex::ZERO, tenant).unwrap().len(), 1);
    }
}

// ============================================================================
// SECTION: Schema Manager
// ============================================================================

#[test]
fn live_manager_provisions_then_second_instance_takes_fast_path() {
    let Some(mut db) = LiveDatabase::connect() else {
        return;
    };
    let config = db.config();
    let layout = config.layout().unwrap();
    let tenant = db.tenant();
    for template in TemplateTable::ALL {
        db.created.extend(layout.table_names(template, tenant));
    }

    let manager = TableSchemaManager::new(layout, Arc::new(db.backend()));
    manager.initialize(&config.template_source()).unwrap();
    let report = manager.check_and_create(tenant).unwrap();
    assert_eq!(report.path, ProvisionPath::Provisioned);
    assert!(report.is_complete(), "failures: {:?}", report.failed);
    assert_eq!(report.created.len(), TemplateTable::ALL.len());

    let restarted = TableSchemaManager::new(layout, Arc::new(db.backend()));
    restarted.initialize(&config.template_source()).unwrap();
    let again = restarted.check_and_create(tenant).unwrap();
    assert_eq!(again.path, ProvisionPath::FastPath);
    assert!(again.created.is_empty());
}
