//! Serve command.

use std::net::IpAddr;

use anyhow::Context;
use clap::Args;
use tracing::info;
use vaultproxy_core::Config;
use vaultproxy_gateway::{Gateway, GatewayConfig};

use super::{build_router, read_password, unlock};

/// Serve command arguments.
#[derive(Args)]
pub struct ServeArgs {
    /// Port number (defaults to server.port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind address (defaults to server.bind)
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Prompt for the password and unlock before serving
    #[arg(long)]
    pub unlock: bool,

    /// Disable CORS for localhost origins
    #[arg(long)]
    pub no_cors: bool,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, config: &Config) -> anyhow::Result<()> {
    let gateway_config = gateway_config(&args, config)?;

    let router = build_router(config).await?;
    if args.unlock {
        unlock(&router, read_password("Vault password: ")?).await?;
    } else {
        info!("Serving locked; send UNLOCK to POST /rpc to load keys");
    }

    let gateway = Gateway::new(gateway_config, router);
    gateway.run(shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}

/// Merge command-line overrides into the configured server settings.
pub fn gateway_config(args: &ServeArgs, config: &Config) -> anyhow::Result<GatewayConfig> {
    let mut gateway_config =
        GatewayConfig::from_server_config(&config.server).context("Invalid server configuration")?;
    if let Some(port) = args.port {
        gateway_config.port = port;
    }
    if let Some(bind) = args.bind {
        gateway_config.bind = bind;
    }
    gateway_config.cors = !args.no_cors;
    Ok(gateway_config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
