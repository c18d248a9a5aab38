// crates/metrics-shard-cli/src/main.rs
// ============================================================================
// Module: Metrics Shard CLI Entry Point
// Description: Operator commands for shard routing and table provisioning.
// Purpose: Inspect routing decisions and provision tenant tables offline.
// Dependencies: clap, metrics-shard-*, serde_json, thiserror, tracing-subscriber
// ============================================================================

//! ## Overview
//! The `metrics-shard` binary validates configuration, prints the routing
//! decision for a tenant, provisions a tenant's tables, and lists durable
//! shard table records. Structured results go to stdout as JSON; logs go to
//! stderr and are filtered by `RUST_LOG` (default `info`).

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use metrics_shard_config::DatabaseBackend;
use metrics_shard_config::MetricsShardConfig;
use metrics_shard_config::config_toml_example;
use metrics_shard_core::CriteriaFilter;
use metrics_shard_core::FixedCurrentTenant;
use metrics_shard_core::ProvisionReport;
use metrics_shard_core::RouteDecision;
use metrics_shard_core::ShardArg;
use metrics_shard_core::ShardDeclaration;
use metrics_shard_core::ShardInterceptor;
use metrics_shard_core::ShardKeyResolver;
use metrics_shard_core::ShardLayout;
use metrics_shard_core::ShardTableBackend;
use metrics_shard_core::ShardTableRecord;
use metrics_shard_core::TableSchemaManager;
use metrics_shard_core::TemplateSource;
use metrics_shard_core::TemplateTable;
use metrics_shard_core::TenantId;
use metrics_shard_core::physical_table_name;
use metrics_shard_pool::RoutingDataSource;
use metrics_shard_store_postgres::PostgresManagerFactory;
use metrics_shard_store_postgres::PostgresShardTableBackend;
use metrics_shard_store_sqlite::SqliteManagerFactory;
use metrics_shard_store_sqlite::SqliteShardTableBackend;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "info";
/// Field name carrying the secondary shard key by default.
const DEFAULT_SECONDARY_KEY: &str = "taskId";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "metrics-shard", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print the routing decision for a tenant.
    Route(RouteCommand),
    /// Create any missing tables for a tenant.
    Provision(ProvisionCommand),
    /// List durable shard table records.
    Tables(TablesCommand),
    /// List the table templates.
    Templates(ConfigArgs),
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration.
    Validate(ConfigArgs),
    /// Print an example configuration.
    Example,
}

/// Shared configuration path argument.
#[derive(Args, Debug, Clone, Default)]
struct ConfigArgs {
    /// Config file path (defaults to `METRICS_SHARD_CONFIG` or
    /// `metrics-shard.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `route`.
#[derive(Args, Debug)]
struct RouteCommand {
    /// Tenant id to route.
    #[arg(long, value_name = "ID", allow_negative_numbers = true)]
    tenant: i64,
    /// Secondary shard key value.
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    secondary: Option<i64>,
    /// Field name the secondary value is supplied under.
    #[arg(long, value_name = "FIELD", default_value = DEFAULT_SECONDARY_KEY)]
    secondary_key: String,
    /// Config source.
    #[command(flatten)]
    config: ConfigArgs,
}

/// Arguments for `provision`.
#[derive(Args, Debug)]
struct ProvisionCommand {
    /// Tenant id to provision; must be positive.
    #[arg(long, value_name = "ID", allow_negative_numbers = true)]
    tenant: i64,
    /// Config source.
    #[command(flatten)]
    config: ConfigArgs,
}

/// Arguments for `tables`.
#[derive(Args, Debug)]
struct TablesCommand {
    /// Restrict the listing to one tenant; must be positive.
    #[arg(long, value_name = "ID", allow_negative_numbers = true)]
    tenant: Option<i64>,
    /// Config source.
    #[command(flatten)]
    config: ConfigArgs,
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// Routing decision printed by `route`.
#[derive(Debug, Serialize)]
struct RouteOutput {
    /// Tenant that was routed.
    tenant_id: TenantId,
    /// Whether the call routes to master.
    master: bool,
    /// Selected datasource key.
    data_source_key: String,
    /// Shard database index, absent for master.
    db_index: Option<i32>,
    /// Table suffix index, `-1` without second-level sharding.
    table_second_index: i64,
    /// Physical table names the call may touch.
    tables: Vec<String>,
}

/// Template listing entry printed by `templates`.
#[derive(Debug, Serialize)]
struct TemplateOutput {
    /// Logical table name.
    name: &'static str,
    /// Size of the template DDL in bytes.
    ddl_bytes: usize,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Route(command) => command_route(&command),
        Commands::Provision(command) => command_provision(&command),
        Commands::Tables(command) => command_tables(&command),
        Commands::Templates(command) => command_templates(&command),
    }
}

/// Installs the stderr log subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(args) => {
            let config = load_config(&args)?;
            write_stdout_line(&format!(
                "config ok: {} backend, {} shard databases",
                config.backend(),
                config.sharding.shard_db_count
            ))?;
            Ok(ExitCode::SUCCESS)
        }
        ConfigCommand::Example => {
            write_stdout_line(config_toml_example().trim_end())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Loads and validates the configuration.
fn load_config(args: &ConfigArgs) -> CliResult<MetricsShardConfig> {
    MetricsShardConfig::load(args.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Returns the validated shard layout.
fn layout_of(config: &MetricsShardConfig) -> CliResult<ShardLayout> {
    config.layout().map_err(|err| CliError::new(err.to_string()))
}

// ============================================================================
// SECTION: Route Command
// ============================================================================

/// Executes the `route` command.
fn command_route(command: &RouteCommand) -> CliResult<ExitCode> {
    let config = load_config(&command.config)?;
    let layout = layout_of(&config)?;
    let output = route_output(
        layout,
        TenantId::new(command.tenant),
        command.secondary,
        &command.secondary_key,
    );
    write_json(&output)?;
    Ok(ExitCode::SUCCESS)
}

/// Routes a tenant the way an intercepted repository call would.
fn route_output(
    layout: ShardLayout,
    tenant_id: TenantId,
    secondary: Option<i64>,
    secondary_key: &str,
) -> RouteOutput {
    let resolver = ShardKeyResolver::new(Arc::new(FixedCurrentTenant(tenant_id)));
    let interceptor = ShardInterceptor::new(layout, resolver);
    let declaration = ShardDeclaration::tenant().with_second_level(secondary_key);
    let filter = secondary.map(|value| CriteriaFilter::default().with(secondary_key, value));
    let args: Vec<ShardArg<'_>> = filter.iter().map(ShardArg::Filter).collect();
    let decision = interceptor.route(&declaration, &args);
    let tables = match &decision {
        RouteDecision::Master => Vec::new(),
        RouteDecision::Sharded(shard) if shard.table_second_index >= 0 => TemplateTable::ALL
            .iter()
            .map(|table| physical_table_name(*table, tenant_id, Some(shard.table_second_index)))
            .collect(),
        RouteDecision::Sharded(_) => TemplateTable::ALL
            .iter()
            .flat_map(|table| layout.table_names(*table, tenant_id))
            .collect(),
    };
    RouteOutput {
        tenant_id,
        master: decision.shard().is_none(),
        data_source_key: decision.data_source_key().to_string(),
        db_index: decision.shard().map(|shard| shard.db_index.get()),
        table_second_index: decision.shard().map_or(-1, |shard| shard.table_second_index),
        tables,
    }
}

// ============================================================================
// SECTION: Provisioning Commands
// ============================================================================

/// Executes the `provision` command.
fn command_provision(command: &ProvisionCommand) -> CliResult<ExitCode> {
    let tenant_id = tenant_arg(command.tenant)?;
    let config = load_config(&command.config)?;
    let report = provision(&config, tenant_id)?;
    write_json(&report)?;
    if report.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Converts a `--tenant` value into a tenant id, rejecting zero and negatives.
fn tenant_arg(raw: i64) -> CliResult<TenantId> {
    TenantId::from_raw(raw)
        .ok_or_else(|| CliError::new(format!("tenant id must be positive, got {raw}")))
}

/// Initializes a schema manager and provisions one tenant.
fn provision(config: &MetricsShardConfig, tenant_id: TenantId) -> CliResult<ProvisionReport> {
    let layout = layout_of(config)?;
    let backend = open_backend(config)?;
    let manager = TableSchemaManager::new(layout, backend);
    manager
        .initialize(&config.template_source())
        .map_err(|err| CliError::new(format!("schema manager initialization failed: {err}")))?;
    let report = manager
        .check_and_create(tenant_id)
        .map_err(|err| CliError::new(format!("provisioning failed: {err}")))?;
    info!(
        %tenant_id,
        created = report.created.len(),
        adopted = report.adopted.len(),
        failed = report.failed.len(),
        "provisioning finished"
    );
    Ok(report)
}

/// Executes the `tables` command.
fn command_tables(command: &TablesCommand) -> CliResult<ExitCode> {
    let tenant_id = command.tenant.map(tenant_arg).transpose()?;
    let config = load_config(&command.config)?;
    let records = list_tables(&config, tenant_id)?;
    write_json(&records)?;
    Ok(ExitCode::SUCCESS)
}

/// Loads durable records for every tenant or one tenant.
fn list_tables(
    config: &MetricsShardConfig,
    tenant_id: Option<TenantId>,
) -> CliResult<Vec<ShardTableRecord>> {
    let layout = layout_of(config)?;
    let backend = open_backend(config)?;
    let records = match tenant_id {
        Some(tenant_id) => backend.load_tenant(layout.db_index(tenant_id), tenant_id),
        None => backend.load_all(),
    };
    records.map_err(|err| CliError::new(format!("failed to load shard tables: {err}")))
}

/// Builds the pools and the shard table backend for the configured engine.
fn open_backend(config: &MetricsShardConfig) -> CliResult<Arc<dyn ShardTableBackend>> {
    match config.backend() {
        DatabaseBackend::Postgres => {
            let router = RoutingDataSource::from_config(config, &PostgresManagerFactory)
                .map_err(|err| CliError::new(err.to_string()))?;
            let backend = PostgresShardTableBackend::new(Arc::new(router))
                .map_err(|err| CliError::new(err.to_string()))?;
            Ok(Arc::new(backend))
        }
        DatabaseBackend::Sqlite => {
            let router = RoutingDataSource::from_config(config, &SqliteManagerFactory)
                .map_err(|err| CliError::new(err.to_string()))?;
            let backend = SqliteShardTableBackend::new(Arc::new(router))
                .map_err(|err| CliError::new(err.to_string()))?;
            Ok(Arc::new(backend))
        }
    }
}

// ============================================================================
// SECTION: Template Command
// ============================================================================

/// Executes the `templates` command.
fn command_templates(args: &ConfigArgs) -> CliResult<ExitCode> {
    let source = if args.config.is_some() {
        load_config(args)?.template_source()
    } else {
        TemplateSource::Bundled
    };
    write_json(&template_listing(&source)?)?;
    Ok(ExitCode::SUCCESS)
}

/// Loads the catalog and summarizes every template.
fn template_listing(source: &TemplateSource) -> CliResult<Vec<TemplateOutput>> {
    let catalog =
        source.load().map_err(|err| CliError::new(format!("failed to load templates: {err}")))?;
    Ok(catalog
        .schemas()
        .map(|schema| TemplateOutput {
            name: schema.table().logical_name(),
            ddl_bytes: schema.ddl().len(),
        })
        .collect())
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes pretty JSON to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to render output: {err}")))?;
    write_stdout_line(&text)
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
