//! `depdock` binary: provisions dependency containers and serves health
//! endpoints from the command line.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = depdock::cli::parse_cli();

    // RUST_LOG overrides --log-level. Logs go to stderr; stdout carries the
    // `up --json` record.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    depdock::cli::run_with_cli(cli).await
}
