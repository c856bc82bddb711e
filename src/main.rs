//! # Fintrack Storage Entry Point

use anyhow::Context;
use fintrack::{
    config::ConfigLoader,
    db,
    server::{AppState, run_server},
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;

    telemetry::init_tracing(&config).context("Failed to initialise tracing")?;
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::info!(profile = %config.profile, config = %redacted_json, "Loaded configuration");
    }

    let pool = db::init_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let state = AppState::production(config, pool)?;

    match state.registry.restore_active().await {
        Ok(Some(config_id)) => tracing::info!(%config_id, "Serving records from the active configuration"),
        Ok(None) => tracing::info!("Serving records from the default storage"),
        Err(err) => tracing::warn!(error = %err, "Could not read the active configuration"),
    }
    if let Err(err) = state.migrations.report_stuck().await {
        tracing::warn!(error = %err, "Could not inspect migration history");
    }

    run_server(state).await
}
