//! Ventanilla Gateway Runtime
//!
//! Entry point: CLI args, logging, configuration, and the HTTP server.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ventanilla::config::{resolve_path, GatewayConfig};
use ventanilla::server;

/// Ventanilla -- Support-Chat Gateway
#[derive(Parser, Debug)]
#[command(
    name = "ventanilla",
    version,
    about = "Conversational gateway for the customer-support backend"
)]
struct Cli {
    /// Path to the gateway config file (default: ./ventanilla.json)
    #[arg(long)]
    config: Option<String>,

    /// Listen address override (e.g. 127.0.0.1:8080)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();

    let config_path: Option<PathBuf> = cli.config.as_deref().map(resolve_path);
    let mut config = GatewayConfig::load(config_path.as_deref())?;

    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    tracing::info!(
        backend = %config.backend_api_url,
        model = %config.inference_model,
        "Starting ventanilla gateway"
    );

    server::serve(config).await
}
