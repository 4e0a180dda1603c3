//! Gemini Rotation Proxy
//!
//! Pass-through proxy for the Gemini API that spreads traffic over a pool of
//! upstream API keys using a round-robin cursor kept in an external store.

use anyhow::Result;
use clap::Parser;
use gemini_rotation_proxy::{
    config::{Environment, Settings},
    server::App,
};

/// Gemini Rotation Proxy
#[derive(Parser, Debug)]
#[command(name = "gemini-rotation-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on (overrides PORT env var)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides HOST env var)
    #[arg(long)]
    host: Option<String>,

    /// Log level: trace, debug, info, warn, error (overrides LOG_LEVEL env var)
    #[arg(long)]
    log_level: Option<String>,

    /// Environment: dev, staging, prod (overrides ENVIRONMENT env var)
    #[arg(short, long)]
    env: Option<Environment>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (before logging, so we can use log_level)
    let mut settings = Settings::load()?;

    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(log_level) = args.log_level {
        settings.log_level = log_level;
    }
    if let Some(env) = args.env {
        settings.environment = env;
    }

    init_tracing(&settings.log_level);

    tracing::info!(
        app_name = %settings.app_name,
        version = %settings.app_version,
        environment = %settings.environment,
        host = %settings.host,
        port = %settings.port,
        rotation_mode = %settings.rotation_mode,
        "Starting application"
    );

    let missing = settings.missing_request_settings();
    if !missing.is_empty() {
        if settings.is_production() {
            tracing::error!(missing = ?missing, "Proxied requests will fail until these settings are provided");
        } else {
            tracing::warn!(missing = ?missing, "Proxied requests will fail until these settings are provided");
        }
    }

    let app = App::new(settings)?;

    app.run_with_graceful_shutdown().await?;

    tracing::info!("Application shutdown complete");

    Ok(())
}

/// Initialize tracing subscriber with the specified log level
fn init_tracing(log_level: &str) {
    // RUST_LOG wins over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .init();
}
