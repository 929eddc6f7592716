//! pest-scan - offline frame scanner
//!
//! Runs the detection model over a sequence of image files (a recorded
//! camera session, a folder of trap photos), merges every Nth frame into
//! the running counts and writes them to the spreadsheet once at the end.

use anyhow::{bail, Context, Result};
use clap::Parser;
use pestwatch_common::config::{resolve_documents_folder, spreadsheet_path_in, DOCUMENTS_ENV_VAR};
use pestwatch_server::config::{load_toml_config, DEFAULT_CLASSIFIER_PATH, DEFAULT_DETECTOR_PATH};
use pestwatch_server::detector::{ModelProbe, DEFAULT_CONFIDENCE_THRESHOLD};
use pestwatch_server::scan::{collect_frames, FrameScanner, DEFAULT_STRIDE};
use pestwatch_server::server::{init_tracing, log_build_banner};
use pestwatch_server::sync::{SyncSettings, TickOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Command-line arguments for pest-scan
#[derive(Parser, Debug)]
#[command(name = "pest-scan")]
#[command(about = "Count pests across image frames and update the spreadsheet")]
#[command(version)]
struct ScanArgs {
    /// Image files or directories of frames
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Process every Nth frame
    #[arg(
        long,
        default_value_t = DEFAULT_STRIDE,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    stride: u64,

    /// Location recorded for the detections
    #[arg(long)]
    location: Option<String>,

    /// Spreadsheet path (overrides --documents)
    #[arg(long, env = "PESTWATCH_SPREADSHEET")]
    spreadsheet: Option<PathBuf>,

    /// Folder holding the spreadsheet (default: ~/Documents)
    #[arg(long)]
    documents: Option<PathBuf>,

    /// Linear classifier artifact (JSON)
    #[arg(long, env = "PESTWATCH_CLASSIFIER")]
    classifier: Option<PathBuf>,

    /// Object detector artifact (ONNX)
    #[arg(long, env = "PESTWATCH_DETECTOR")]
    detector: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "PESTWATCH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ScanArgs::parse();

    let (toml_config, _) =
        load_toml_config(args.config.as_deref()).context("Failed to load configuration file")?;
    init_tracing(&toml_config.logging.default_directives());
    log_build_banner("scan");

    let spreadsheet = match args
        .spreadsheet
        .clone()
        .or_else(|| toml_config.spreadsheet_path.clone())
    {
        Some(path) => path,
        None => spreadsheet_path_in(&resolve_documents_folder(
            args.documents.as_deref(),
            DOCUMENTS_ENV_VAR,
            toml_config.documents_folder.as_deref(),
        )),
    };

    let probe = ModelProbe {
        classifier_path: Some(
            args.classifier
                .clone()
                .or_else(|| toml_config.model.classifier_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CLASSIFIER_PATH)),
        ),
        detector_path: Some(
            args.detector
                .clone()
                .or_else(|| toml_config.model.detector_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DETECTOR_PATH)),
        ),
        confidence_threshold: toml_config
            .model
            .confidence_threshold
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
    };
    let model = Arc::new(
        probe
            .select()
            .context("Failed to load a pest detection model")?,
    );
    info!("Using {} model", model.kind());

    let frames = collect_frames(&args.paths)?;
    if frames.is_empty() {
        bail!("No image frames found");
    }
    info!(
        "Scanning {} frame(s), processing every {}",
        frames.len(),
        args.stride
    );

    let location = args
        .location
        .clone()
        .or_else(|| toml_config.default_location.clone());
    let scanner = FrameScanner::new(model, SyncSettings::new(&spreadsheet))
        .with_stride(args.stride)
        .with_location(location);

    let report = scanner
        .run(&frames)
        .await
        .with_context(|| format!("Failed to scan into {}", spreadsheet.display()))?;

    if report.failed > 0 {
        warn!("{} frame(s) could not be scored", report.failed);
    }
    match report.outcome {
        TickOutcome::Written {
            updated, appended, ..
        } => info!(
            "Processed {} frame(s); spreadsheet {} updated ({} updated, {} appended)",
            report.processed,
            spreadsheet.display(),
            updated,
            appended
        ),
        TickOutcome::NoRecords => info!(
            "Processed {} frame(s); no pests detected, spreadsheet unchanged",
            report.processed
        ),
        TickOutcome::NoDocument => warn!("Spreadsheet {} not found", spreadsheet.display()),
    }

    Ok(())
}
