//! # PestWatch Common Library
//!
//! Shared code for the PestWatch detection server and the scan tool:
//! - Pest label catalog and spreadsheet layout names
//! - Configuration file location and documents folder resolution
//! - Timestamp formatting used in the spreadsheet
//! - Common error type

pub mod catalog;
pub mod config;
pub mod error;
pub mod time;

pub use catalog::{DEFAULT_LOCATION, PEST_LABELS};
pub use error::{Error, Result};
