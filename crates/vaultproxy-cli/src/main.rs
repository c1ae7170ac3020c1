//! VaultProxy CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vaultproxy_cli::{load_config, run, Cli};
use vaultproxy_core::config::LoggingConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_logging(cli.verbose, &config.logging);

    // Run the command
    run(cli, config).await
}

fn init_logging(verbose: u8, logging: &LoggingConfig) {
    let default_directive = match verbose {
        0 => format!("vaultproxy={}", logging.level.as_str()),
        1 => "vaultproxy=debug".to_string(),
        _ => "vaultproxy=trace,tower_http=debug".to_string(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into());

    // Logs go to stderr so command output stays pipeable.
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
