//! CLI command definitions for depdock.
//!
//! `up` provisions one dependency and holds it until interrupted; `health`
//! serves or queries liveness and readiness endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::backends::{
    self, Backend, DynamoDbOptions, Endpoint, EtcdOptions, MigrationInitializer, MigrationOptions,
    MigrationTarget, MySqlOptions, PostgresOptions, RedisOptions, ServiceContainer, VaultOptions,
};
use crate::container::options::{self, ContainerOption};
use crate::container::{DockerEngine, RuntimeEnvironment};
use crate::health::{HealthClient, HealthServer, HttpGetCheck, ReadinessCheck, TcpDialCheck};

/// Default port of the health server and client.
const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Disposable dependency containers for integration tests.
#[derive(Parser)]
#[command(name = "depdock")]
#[command(about = "Provision disposable dependency containers for integration tests")]
#[command(version)]
#[command(
    long_about = "depdock starts throwaway Redis, MySQL, PostgreSQL, Vault, DynamoDB Local and etcd containers, waits until they are usable and prints their endpoints.\n\nSetting TEST_<BACKEND>_HOST points at an existing server instead of starting a container.\n\nExample usage:\n  depdock up mysql --json\n  depdock health readiness --host localhost --port 8080"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Start a dependency, print its endpoint and keep it until Ctrl-C.
    Up(UpArgs),

    /// Serve or query liveness and readiness endpoints.
    Health(HealthArgs),
}

/// Dependency kinds `up` can provision.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Redis,
    Mysql,
    #[value(alias = "postgres")]
    Postgresql,
    Vault,
    Dynamodb,
    Etcd,
}

/// Arguments for `depdock up`.
#[derive(Parser, Debug)]
pub struct UpArgs {
    /// Dependency to provision.
    #[arg(value_enum)]
    pub backend: BackendKind,

    /// Migration image to run once the database is healthy (mysql and postgresql only).
    #[arg(long, env = "DEPDOCK_MIGRATION_IMAGE")]
    pub migrate: Option<String>,

    /// Tag of the migration image.
    #[arg(long, default_value = "latest")]
    pub migrate_tag: String,

    /// Command overriding the migration image's default.
    #[arg(long, num_args = 1.., value_delimiter = ' ')]
    pub migrate_command: Option<Vec<String>>,

    /// Print the endpoint as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `depdock health`.
#[derive(Parser, Debug)]
pub struct HealthArgs {
    #[command(subcommand)]
    pub command: HealthSubcommand,
}

/// Health subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum HealthSubcommand {
    /// Serve /liveness and /readiness backed by TCP and HTTP checks.
    Serve(HealthServeArgs),

    /// Query a remote /liveness endpoint.
    Liveness(HealthTargetArgs),

    /// Query a remote /readiness endpoint.
    Readiness(HealthTargetArgs),
}

/// Arguments for `depdock health serve`.
#[derive(Parser, Debug)]
pub struct HealthServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// `host:port` that must accept TCP connections (repeatable).
    #[arg(long = "tcp")]
    pub tcp: Vec<String>,

    /// URL that must answer GET with a success status (repeatable).
    #[arg(long = "http")]
    pub http: Vec<String>,
}

/// Arguments for `depdock health liveness|readiness`.
#[derive(Parser, Debug)]
pub struct HealthTargetArgs {
    /// Host of the remote health server.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port of the remote health server.
    #[arg(long, default_value_t = DEFAULT_HEALTH_PORT)]
    pub port: u16,
}

/// What `up` prints once the dependency is usable.
#[derive(Debug, Serialize)]
struct ProvisionedService<'a, B: Serialize> {
    kind: &'static str,
    url: &'a str,
    address: &'a Endpoint,
    container_id: Option<&'a str>,
    external: bool,
    options: &'a B,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with already parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Up(args) => run_up_command(args).await,
        Commands::Health(args) => run_health_command(args).await,
    }
}

// ============================================================================
// Up Command Implementation
// ============================================================================

async fn run_up_command(args: UpArgs) -> anyhow::Result<()> {
    let migration = migration_options(&args);
    if migration.is_some() && !matches!(args.backend, BackendKind::Mysql | BackendKind::Postgresql) {
        anyhow::bail!("--migrate is only supported for mysql and postgresql");
    }

    match args.backend {
        BackendKind::Redis => hold(RedisOptions::from_env()?, Vec::new(), args.json).await,
        BackendKind::Vault => hold(VaultOptions::from_env()?, Vec::new(), args.json).await,
        BackendKind::Dynamodb => hold(DynamoDbOptions::from_env()?, Vec::new(), args.json).await,
        BackendKind::Etcd => hold(EtcdOptions::from_env()?, Vec::new(), args.json).await,
        BackendKind::Mysql => {
            let backend = MySqlOptions::from_env()?;
            let Some(migration) = migration else {
                return hold(backend, Vec::new(), args.json).await;
            };
            if backend.is_external() {
                let service = ServiceContainer::external(backend);
                migrate_external(MigrationTarget::from_mysql(&service).await?, &migration).await?;
                return hold_service(service, args.json).await;
            }
            let init = MigrationInitializer::mysql(&backend, migration);
            hold(backend, vec![options::initializer(Arc::new(init))], args.json).await
        }
        BackendKind::Postgresql => {
            let backend = PostgresOptions::from_env()?;
            let Some(migration) = migration else {
                return hold(backend, Vec::new(), args.json).await;
            };
            if backend.is_external() {
                let service = ServiceContainer::external(backend);
                migrate_external(MigrationTarget::from_postgres(&service).await?, &migration).await?;
                return hold_service(service, args.json).await;
            }
            let init = MigrationInitializer::postgres(&backend, migration);
            hold(backend, vec![options::initializer(Arc::new(init))], args.json).await
        }
    }
}

fn migration_options(args: &UpArgs) -> Option<MigrationOptions> {
    let image = args.migrate.as_ref()?;
    let mut migration = MigrationOptions::new(image.clone()).with_tag(args.migrate_tag.clone());
    if let Some(command) = &args.migrate_command {
        migration = migration.with_command(command.clone());
    }
    Some(migration)
}

async fn migrate_external(target: MigrationTarget, migration: &MigrationOptions) -> anyhow::Result<()> {
    info!(host = %target.host, database = %target.database, "Migrating external database");
    let engine = Arc::new(DockerEngine::new()?);
    backends::run_migration(engine, RuntimeEnvironment::detect(), &target, migration).await?;
    Ok(())
}

async fn hold<B>(backend: B, extra: Vec<ContainerOption>, json: bool) -> anyhow::Result<()>
where
    B: Backend + Serialize,
{
    let service = if backend.is_external() {
        ServiceContainer::external(backend)
    } else {
        let engine = Arc::new(DockerEngine::new()?);
        backends::setup_with_options(backend, engine, RuntimeEnvironment::detect(), extra).await?
    };
    hold_service(service, json).await
}

/// Prints the endpoint, waits for Ctrl-C and tears the service down.
async fn hold_service<B>(mut service: ServiceContainer<B>, json: bool) -> anyhow::Result<()>
where
    B: Backend + Serialize,
{
    print_service(&service, json)?;

    info!(kind = service.backend().kind(), "Press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    if let Err(e) = service.teardown().await {
        warn!(error = %e, "Failed to tear down dependency");
        return Err(e.into());
    }
    info!(kind = service.backend().kind(), "Dependency torn down");
    Ok(())
}

fn print_service<B>(service: &ServiceContainer<B>, json: bool) -> anyhow::Result<()>
where
    B: Backend + Serialize,
{
    let summary = ProvisionedService {
        kind: service.backend().kind(),
        url: service.url(),
        address: service.address(),
        container_id: service.container().and_then(|c| c.id()),
        external: service.is_external(),
        options: service.backend(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{} ready at {}", summary.kind, summary.url);
        if let Some(id) = summary.container_id {
            println!("  container: {}", id);
        }
    }
    Ok(())
}

// ============================================================================
// Health Command Implementation
// ============================================================================

async fn run_health_command(args: HealthArgs) -> anyhow::Result<()> {
    match args.command {
        HealthSubcommand::Serve(args) => {
            let mut checks: Vec<Arc<dyn ReadinessCheck>> = Vec::new();
            for addr in args.tcp {
                checks.push(Arc::new(TcpDialCheck::new(addr)));
            }
            for url in args.http {
                checks.push(Arc::new(HttpGetCheck::new(url)));
            }

            HealthServer::new(checks)
                .serve(args.listen, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                    }
                })
                .await?;
            Ok(())
        }
        HealthSubcommand::Liveness(target) => {
            let client = HealthClient::new(&target.host, target.port)?;
            client.liveness().await?;
            println!("{} is alive", client.base_url());
            Ok(())
        }
        HealthSubcommand::Readiness(target) => {
            let client = HealthClient::new(&target.host, target.port)?;
            client.readiness().await?;
            println!("{} is ready", client.base_url());
            Ok(())
        }
    }
}
