//! Upload validation and image decoding

use crate::error::{Error, Result};
use image::DynamicImage;

/// File extensions accepted for uploads (compared case-insensitively)
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Message returned for a rejected file name
pub const INVALID_FORMAT_MESSAGE: &str = "Invalid image format";

/// True when the text after the last `.` is an allowed extension
pub fn has_allowed_extension(file_name: &str) -> bool {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Validate an upload's file name.
///
/// A missing or empty name and a disallowed extension are both client
/// errors.
pub fn validate_file_name(file_name: Option<&str>) -> Result<()> {
    match file_name {
        Some(name) if !name.is_empty() && has_allowed_extension(name) => Ok(()),
        _ => Err(Error::ClientInput(INVALID_FORMAT_MESSAGE.to_string())),
    }
}

/// Decode uploaded bytes into a bitmap
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(Error::Decode("empty upload".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| Error::Decode(e.to_string()))
}
