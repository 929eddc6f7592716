//! Configuration file location and documents folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used under the platform config directory
pub const APP_DIR: &str = "pestwatch";

/// Environment variable overriding the documents folder
pub const DOCUMENTS_ENV_VAR: &str = "PESTWATCH_DOCUMENTS";

/// File name of the spreadsheet inside the documents folder
pub const SPREADSHEET_FILE_NAME: &str = "pest_detection_data.xlsx";

/// Documents folder resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file value
/// 4. OS-dependent default (fallback)
pub fn resolve_documents_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config_value: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        debug!("Documents folder from command line: {}", path.display());
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            debug!("Documents folder from {}: {}", env_var_name, path);
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = config_value {
        debug!("Documents folder from config file: {}", path.display());
        return path.to_path_buf();
    }

    // Priority 4: OS-dependent default
    default_documents_folder()
}

/// OS-dependent documents folder (`~/Documents` on all desktop platforms)
pub fn default_documents_folder() -> PathBuf {
    dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Documents")))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Spreadsheet path inside a documents folder
pub fn spreadsheet_path_in(documents: &Path) -> PathBuf {
    documents.join(SPREADSHEET_FILE_NAME)
}

/// Find the TOML config file.
///
/// An explicitly given path must exist. Otherwise the user config
/// directory is tried first, then `/etc/pestwatch/config.toml` on Linux.
/// Returns `Error::NotFound` when no file is present; callers treat that
/// as "use defaults".
pub fn locate_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"));
    if let Some(path) = user_config {
        if path.is_file() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
        if system_config.is_file() {
            return Ok(system_config);
        }
    }

    Err(Error::NotFound("No config file found".to_string()))
}

/// Read a config file and parse it as TOML into `T`
pub fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))
}

/// Interpret an environment variable as a boolean switch.
///
/// `1`, `true`, `yes` and `on` (any case) are true; anything else,
/// including an unset variable, is false.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}
