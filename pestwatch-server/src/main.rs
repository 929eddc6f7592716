//! pestwatch-server - pest detection HTTP service
//!
//! Accepts image uploads, counts pests with the model selected at startup,
//! and mirrors the cumulative counts into an `.xlsx` document.

use anyhow::{Context, Result};
use clap::Parser;
use pestwatch_common::config::env_flag;
use pestwatch_server::config::{load_toml_config, CliArgs, ServerConfig, HOSTED_ENV_VAR};
use pestwatch_server::server::{init_tracing, log_build_banner, serve, shutdown_signal};
use pestwatch_server::sync::SpreadsheetSynchronizer;
use pestwatch_server::{build_router, AppState, DetectionAggregator};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // TOML is read before tracing so its log level can apply
    let (toml_config, config_path) =
        load_toml_config(args.config.as_deref()).context("Failed to load configuration file")?;

    init_tracing(&toml_config.logging.default_directives());
    log_build_banner("server");

    match &config_path {
        Some(path) => info!("Configuration file: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    let hosted = env_flag(HOSTED_ENV_VAR);
    let config = ServerConfig::resolve(&args, &toml_config, hosted)
        .context("Invalid configuration")?;

    let model = config
        .model
        .select()
        .context("Failed to load a pest detection model")?;
    info!("Using {} model", model.kind());

    let aggregator = Arc::new(DetectionAggregator::new());

    let sync_handle = if config.sync_enabled {
        let synchronizer =
            SpreadsheetSynchronizer::new(config.sync.clone(), Arc::clone(&aggregator));
        info!("Spreadsheet: {}", synchronizer.path().display());

        if let Err(e) = synchronizer.ensure_document().await {
            error!("Could not create spreadsheet: {}", e);
        }
        match synchronizer.seed_aggregator().await {
            Ok(n) if n > 0 => info!("Seeded {} pest record(s) from spreadsheet", n),
            Ok(_) => {}
            Err(e) => warn!("Could not seed counts from spreadsheet: {}", e),
        }

        Some(synchronizer.spawn())
    } else if hosted {
        info!("Hosted deployment ({}=true), spreadsheet sync disabled", HOSTED_ENV_VAR);
        None
    } else {
        info!("Spreadsheet sync disabled");
        None
    };

    let state = AppState::new(aggregator, Arc::new(model))
        .with_default_location(config.default_location.clone())
        .with_max_upload_bytes(config.max_upload_bytes);
    let app = build_router(state);

    let served = serve(&config.listen_addr(), app, shutdown_signal()).await;

    if let Some(handle) = sync_handle {
        handle.shutdown().await;
    }

    served.context("Server error")?;
    info!("Server shutdown complete");
    Ok(())
}
