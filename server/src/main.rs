//! Lens gateway service
//!
//! Opens the configured store and serves the viewer API until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use lens_server::{
    config::{LensConfig, LogFormat},
    gateway::QueryGateway,
    server::{self, ApiState},
    storage::StorageBackend,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "lens-server")]
#[command(about = "Lens - query capture storage and viewer API", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "LENS_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = LensConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    init_tracing(args.verbose, config.log_format);

    info!("Starting Lens gateway on {}", config.listen_addr);

    let store = StorageBackend::open(&config.storage).context("Failed to open query store")?;
    info!("Capturing into {}", lens_server::storage::QueryStore::location_name(&store));

    let gateway = QueryGateway::new(Arc::new(store));
    let state = ApiState::new(gateway, config.route_prefix());

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Invalid listen address")?;

    server::serve(addr, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutting down");
    })
    .await
    .context("HTTP server error")?;

    Ok(())
}
