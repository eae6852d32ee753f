//! LabDash server
//!
//! Serves the lab dashboard API and its web UI.

use anyhow::Context;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use labdash_common::DashboardConfig;
use labdash_web::WebServer;

#[derive(Parser)]
#[command(name = "labdash")]
#[command(about = "LabDash - Proxmox lab dashboard")]
#[command(version)]
struct Cli {
    /// Listen address
    #[arg(short, long, env = "LABDASH_LISTEN", default_value = "0.0.0.0")]
    listen: IpAddr,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("LabDash v{}", env!("CARGO_PKG_VERSION"));

    let config = DashboardConfig::from_env().context("failed to load configuration")?;
    info!(proxmox = %config.proxmox.url, pfsense = %config.pfsense.url, "configuration loaded");

    let server = WebServer::from_config(&config).context("failed to initialize clients")?;
    server.serve(SocketAddr::new(cli.listen, cli.port)).await
}
