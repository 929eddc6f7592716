//! Configuration for pestwatch-server
//!
//! Settings sources, highest priority first:
//!
//! 1. Command-line arguments
//! 2. Environment variables (via clap `env`)
//! 3. TOML configuration file
//! 4. Built-in defaults
//!
//! The synchronizer is additionally disabled in hosted deployments
//! (`RENDER=true`), where no desktop documents folder exists.

use crate::detector::{ModelProbe, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::error::{Error, Result};
use crate::sync::{SyncSettings, DEFAULT_SHUTDOWN_GRACE, DEFAULT_SYNC_INTERVAL};
use clap::Parser;
use pestwatch_common::config::{
    load_toml, locate_config_file, resolve_documents_folder, spreadsheet_path_in,
    DOCUMENTS_ENV_VAR,
};
use pestwatch_common::DEFAULT_LOCATION;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_CLASSIFIER_PATH: &str = "pest_detection_model.json";
pub const DEFAULT_DETECTOR_PATH: &str = "yolov8n.onnx";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Environment variable marking a hosted (non-desktop) deployment
pub const HOSTED_ENV_VAR: &str = "RENDER";

/// Command-line arguments for pestwatch-server
#[derive(Parser, Debug, Default)]
#[command(name = "pestwatch-server")]
#[command(about = "Pest detection API with spreadsheet mirroring")]
#[command(version)]
pub struct CliArgs {
    /// Port to listen on
    #[arg(short, long, env = "PESTWATCH_PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "PESTWATCH_BIND")]
    pub bind: Option<String>,

    /// TOML configuration file
    #[arg(short, long, env = "PESTWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Folder holding the spreadsheet (default: ~/Documents)
    #[arg(long)]
    pub documents: Option<PathBuf>,

    /// Spreadsheet path (overrides --documents)
    #[arg(long, env = "PESTWATCH_SPREADSHEET")]
    pub spreadsheet: Option<PathBuf>,

    /// Linear classifier artifact (JSON)
    #[arg(long, env = "PESTWATCH_CLASSIFIER")]
    pub classifier: Option<PathBuf>,

    /// Object detector artifact (ONNX)
    #[arg(long, env = "PESTWATCH_DETECTOR")]
    pub detector: Option<PathBuf>,

    /// Disable the background spreadsheet synchronizer
    ///
    /// The environment form accepts 1/0, true/false, yes/no and on/off.
    #[arg(
        long,
        env = "PESTWATCH_NO_SYNC",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub no_sync: bool,
}

/// Bootstrap configuration loaded from the TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub documents_folder: Option<PathBuf>,
    pub spreadsheet_path: Option<PathBuf>,
    pub default_location: Option<String>,
    pub max_upload_bytes: Option<usize>,
    pub model: ModelSection,
    pub sync: SyncSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub classifier_path: Option<PathBuf>,
    pub detector_path: Option<PathBuf>,
    pub confidence_threshold: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub enabled: Option<bool>,
    pub interval_ms: Option<u64>,
    pub append_missing_labels: Option<bool>,
    pub shutdown_grace_ms: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Filter directives used when RUST_LOG is unset
    pub fn default_directives(&self) -> String {
        format!("pestwatch_server={},tower_http=info", self.level)
    }
}

/// Load the TOML file named on the command line or found in the standard
/// locations. No file at all is not an error; an explicitly named file
/// that is missing or malformed is.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<(TomlConfig, Option<PathBuf>)> {
    match locate_config_file(explicit) {
        Ok(path) => {
            let config = load_toml(&path)?;
            Ok((config, Some(path)))
        }
        Err(pestwatch_common::Error::NotFound(_)) => Ok((TomlConfig::default(), None)),
        Err(e) => Err(e.into()),
    }
}

/// Fully resolved server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub spreadsheet_path: PathBuf,
    pub default_location: String,
    pub max_upload_bytes: usize,
    pub model: ModelProbe,
    pub sync_enabled: bool,
    pub sync: SyncSettings,
}

impl ServerConfig {
    /// Merge CLI/env arguments over the TOML file over defaults.
    ///
    /// `hosted` disables the synchronizer regardless of other settings.
    pub fn resolve(args: &CliArgs, toml: &TomlConfig, hosted: bool) -> Result<Self> {
        let spreadsheet_path = match args
            .spreadsheet
            .clone()
            .or_else(|| toml.spreadsheet_path.clone())
        {
            Some(path) => path,
            None => spreadsheet_path_in(&resolve_documents_folder(
                args.documents.as_deref(),
                DOCUMENTS_ENV_VAR,
                toml.documents_folder.as_deref(),
            )),
        };

        let confidence_threshold = toml
            .model
            .confidence_threshold
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        if !(0.0..1.0).contains(&confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence_threshold must be in [0, 1), got {}",
                confidence_threshold
            )));
        }

        let interval = toml
            .sync
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SYNC_INTERVAL);
        if interval.is_zero() {
            return Err(Error::Config("sync.interval_ms must be positive".to_string()));
        }

        let default_location = toml
            .default_location
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        Ok(Self {
            bind: args
                .bind
                .clone()
                .or_else(|| toml.bind.clone())
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            port: args.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            default_location,
            max_upload_bytes: toml.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            model: ModelProbe {
                classifier_path: Some(
                    args.classifier
                        .clone()
                        .or_else(|| toml.model.classifier_path.clone())
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_CLASSIFIER_PATH)),
                ),
                detector_path: Some(
                    args.detector
                        .clone()
                        .or_else(|| toml.model.detector_path.clone())
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_DETECTOR_PATH)),
                ),
                confidence_threshold,
            },
            sync_enabled: !args.no_sync && !hosted && toml.sync.enabled.unwrap_or(true),
            sync: SyncSettings {
                path: spreadsheet_path.clone(),
                interval,
                append_missing_labels: toml.sync.append_missing_labels.unwrap_or(true),
                shutdown_grace: toml
                    .sync
                    .shutdown_grace_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_SHUTDOWN_GRACE),
            },
            spreadsheet_path,
        })
    }

    /// `host:port` to bind the listener to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
