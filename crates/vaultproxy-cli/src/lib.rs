//! VaultProxy command-line interface.

pub mod commands;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use vaultproxy_core::Config;

/// VaultProxy - encrypted API key vault and injecting local proxy
#[derive(Parser)]
#[command(name = "vaultproxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "VAULTPROXY_CONFIG", global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Manage encrypted provider keys
    Keys(commands::keys::KeysArgs),

    /// Show key store and session status
    Status(commands::status::StatusArgs),

    /// Unlock and send one request through the proxy
    Request(commands::request::RequestArgs),

    /// Run the local proxy server
    Serve(commands::serve::ServeArgs),

    /// Share keys with another machine
    Share(commands::share::ShareArgs),

    /// Show version information
    Version,
}

/// Load configuration from `path` or the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    Config::load_or_default(path).context("Failed to load configuration")
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Commands::Keys(args) => commands::keys::run(args, &config).await,
        Commands::Status(args) => commands::status::run(args, &config).await,
        Commands::Request(args) => commands::request::run(args, &config).await,
        Commands::Serve(args) => commands::serve::run(args, &config).await,
        Commands::Share(args) => commands::share::run(args, &config).await,
        Commands::Version => {
            println!("vaultproxy {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
