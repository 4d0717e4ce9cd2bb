use anyhow::Context;
use culqi_payments::{config::AppConfig, init_server, init_tracing, LogFormat};
use std::env;
use std::path::Path;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(LogFormat::from_env());

    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/payments.yaml".to_string());

    let mut config = if Path::new(&config_path).exists() {
        info!(path = %config_path, "Loading configuration");
        AppConfig::from_file(&config_path)
            .with_context(|| format!("Failed to load configuration from {}", config_path))?
    } else {
        info!(path = %config_path, "No configuration file, using defaults");
        AppConfig::default()
    };

    config
        .apply_env_overrides()
        .context("Invalid environment override")?;

    if let Err(e) = init_server(config).await {
        error!(error = %e, "Payments service failed");
        return Err(e.into());
    }

    Ok(())
}
