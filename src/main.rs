//! # Connect CLI Entry Point
//!
//! Loads layered configuration, initializes tracing and runs the requested subcommand.

use anyhow::Context;
use connections_client::{cli, config::ConfigLoader, telemetry::init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::parse_cli();

    // Load configuration from layered env files and variables
    let mut config = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    init_tracing(&config).context("failed to initialize tracing")?;
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, profile = %config.profile, "Loaded configuration");
    }

    cli::run_with_cli(cli, &config).await
}
