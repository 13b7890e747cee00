//! Lumen wallet sync daemon - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Keeps wallet balances in sync with the Lumen push socket.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via LUMEN_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is opened
    lumen_ws::init_crypto();

    let args = Args::parse();

    lumen_telemetry::init_logging()?;

    info!("Starting Lumen sync v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > LUMEN_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("LUMEN_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = lumen_app::AppConfig::from_file(&config_path)?;
    info!(
        portal = %config.portal.base_url,
        horizon = %config.horizon.url,
        wallets = config.wallets.len(),
        "Configuration loaded"
    );

    lumen_app::Application::new(config)?.run().await?;

    Ok(())
}
