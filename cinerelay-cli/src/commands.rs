//! CLI command implementations

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;
use cinerelay_core::GatewayConfig;
use cinerelay_core::catalog::{HttpCatalog, SourceResolver};
use cinerelay_core::http::build_client;
use tracing::{info, warn};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Base URL of the upstream catalog API
        #[arg(long)]
        upstream: Option<String>,
    },
    /// Resolve the source that would be streamed for an item
    Resolve {
        /// Catalog item id
        item_id: String,
        /// Quality label, the configured default when omitted
        #[arg(short, long)]
        quality: Option<String>,
    },
}

/// Runs the selected command against configuration from the environment.
///
/// # Errors
///
/// - `anyhow::Error` - Configuration is invalid after applying flags
/// - `anyhow::Error` - The server fails to bind or serve
/// - `anyhow::Error` - Source resolution fails
pub async fn run_command(command: Commands) -> Result<()> {
    let config = GatewayConfig::from_env();
    match command {
        Commands::Serve {
            host,
            port,
            upstream,
        } => serve(config, host, port, upstream).await,
        Commands::Resolve { item_id, quality } => resolve(config, item_id, quality).await,
    }
}

async fn serve(
    mut config: GatewayConfig,
    host: Option<String>,
    port: Option<u16>,
    upstream: Option<String>,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(upstream) = upstream {
        config.upstream.base_url = upstream;
    }
    config.validate().context("invalid gateway configuration")?;

    cinerelay_web::run_server(config, shutdown_signal())
        .await
        .context("gateway server failed")
}

async fn resolve(config: GatewayConfig, item_id: String, quality: Option<String>) -> Result<()> {
    config.validate().context("invalid gateway configuration")?;

    let client = build_client(&config.upstream).context("failed to build HTTP client")?;
    let resolver = SourceResolver::new(Arc::new(HttpCatalog::new(client, &config.upstream)));
    let quality = quality.unwrap_or_else(|| config.default_quality.clone());

    let source = resolver
        .resolve(&item_id, &quality)
        .await
        .with_context(|| format!("failed to resolve {item_id} at {quality}"))?;

    println!("{}", serde_json::to_string_pretty(&source)?);
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested, draining connections"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C, serving until killed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
