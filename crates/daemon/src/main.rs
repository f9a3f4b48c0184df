// taiga-syncd: receive Taiga updates, commit them, push them.

use anyhow::Context;
use clap::{CommandFactory, Parser};
use taiga_sync_daemon::config::{Cli, ServiceConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = parse_config();

    info!(version = env!("CARGO_PKG_VERSION"), "starting taiga-syncd");
    taiga_sync_daemon::runtime::run(config).await.context("taiga-syncd terminated unexpectedly")
}

// Usage problems print the help text and exit with status 1.
fn parse_config() -> ServiceConfig {
    let cli = Cli::try_parse().unwrap_or_else(|error| {
        if !error.use_stderr() {
            error.exit();
        }
        let _ = error.print();
        std::process::exit(1);
    });

    ServiceConfig::from_cli(cli).unwrap_or_else(|error| {
        eprintln!("{error}");
        eprintln!();
        eprintln!("{}", Cli::command().render_help());
        std::process::exit(1);
    })
}
