//! Error types for pestwatch-server
//!
//! Module-specific error types using thiserror. Request-path failures map
//! onto HTTP responses in `api::error`; synchronizer failures are
//! `sync::SyncError` and never reach the request path.

use thiserror::Error;

/// Main error type for pestwatch-server
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or unacceptable upload
    #[error("{0}")]
    ClientInput(String),

    /// Uploaded bytes are not a decodable image
    #[error("Could not decode image: {0}")]
    Decode(String),

    /// Model could not score the image
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Model artifact present but unusable
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// No model backend could be selected at startup
    #[error("No usable model: {0}")]
    ModelUnavailable(String),

    /// Spreadsheet synchronization errors
    #[error("Spreadsheet sync error: {0}")]
    Sync(#[from] crate::sync::SyncError),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),
}

impl From<pestwatch_common::Error> for Error {
    fn from(e: pestwatch_common::Error) -> Self {
        match e {
            pestwatch_common::Error::Io(io) => Error::Io(io),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using pestwatch-server Error
pub type Result<T> = std::result::Result<T, Error>;
