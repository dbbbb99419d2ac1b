//! demon-ring server binary.
//!
//! Binds the configured listeners and serves each with the echo handler
//! until SIGINT/SIGTERM, then drains gracefully within the configured grace
//! period. A second signal during the drain forces an immediate stop.
//!
//! ```text
//! demon-ring --config server.toml
//! demon-ring --bind 0.0.0.0:7000 --bind [::]:7000 --log-level debug
//! ```

use std::path::PathBuf;

use clap::Parser;

use demon_ring::config::{self, validation, ConfigError, ListenerConfig, ServerConfig};
use demon_ring::lifecycle::startup;
use demon_ring::observability::logging;
use demon_ring::EchoHandler;

#[derive(Parser)]
#[command(name = "demon-ring")]
#[command(about = "Connection-accepting server with graceful shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address; repeat for several. Replaces configured listeners.
    #[arg(short, long = "bind")]
    bind: Vec<String>,

    /// Log level, overriding the configuration file.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => ServerConfig::default(),
    };

    if !cli.bind.is_empty() {
        cfg.listeners = cli
            .bind
            .iter()
            .map(|addr| ListenerConfig {
                bind_address: addr.clone(),
                ..ListenerConfig::default()
            })
            .collect();
    }
    if cfg.listeners.is_empty() {
        cfg.listeners.push(ListenerConfig::default());
    }
    if let Some(level) = cli.log_level {
        cfg.observability.log_level = level;
    }
    validation::validate_config(&cfg).map_err(ConfigError::Validation)?;

    logging::init(&cfg.observability.log_level)?;

    tracing::info!("demon-ring v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        listeners = cfg.listeners.len(),
        grace_period_secs = cfg.shutdown.grace_period_secs,
        metrics_enabled = cfg.observability.metrics_enabled,
        "Configuration loaded"
    );

    startup::run(cfg, EchoHandler::new()).await?;
    Ok(())
}
