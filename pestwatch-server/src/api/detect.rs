//! POST /detect
//!
//! Multipart upload: file field `image`, optional text field `location`.

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::ApiError;
use crate::detector::DetectionBatch;
use crate::error::Error;
use crate::validation;
use crate::AppState;

pub const IMAGE_FIELD: &str = "image";
pub const LOCATION_FIELD: &str = "location";
pub const NO_IMAGE_MESSAGE: &str = "No image provided";

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub success: bool,
    /// Counts for this request only
    pub detections: DetectionBatch,
}

/// Parts of the multipart form this endpoint understands
#[derive(Debug, Default)]
struct DetectForm {
    image: Option<(Option<String>, Bytes)>,
    location: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<DetectForm, Error> {
    let mut form = DetectForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::ClientInput(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(IMAGE_FIELD) => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::ClientInput(format!("Could not read upload: {}", e)))?;
                form.image = Some((file_name, bytes));
            }
            Some(LOCATION_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::ClientInput(format!("Could not read location: {}", e)))?;
                form.location = Some(text);
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok(form)
}

/// Validate, decode and score an upload, then merge the counts.
///
/// Nothing is merged unless inference succeeds.
pub async fn detect(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    // A body that is not multipart at all carries no image
    let multipart =
        multipart.map_err(|_| Error::ClientInput(NO_IMAGE_MESSAGE.to_string()))?;
    let form = read_form(multipart).await?;

    let (file_name, bytes) = form
        .image
        .ok_or_else(|| Error::ClientInput(NO_IMAGE_MESSAGE.to_string()))?;
    validation::validate_file_name(file_name.as_deref())?;

    let model = Arc::clone(&state.model);
    let batch = tokio::task::spawn_blocking(move || {
        let image = validation::decode_image(&bytes)?;
        model.detect(&image)
    })
    .await
    .map_err(|e| Error::Inference(format!("inference task failed: {}", e)))??;

    let location = form
        .location
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| state.default_location.clone());
    let touched = state.aggregator.merge(&batch, Some(&location)).await;

    info!(
        "Detected {} pest(s) across {} label(s) in {} (location {})",
        batch.total(),
        touched,
        file_name.as_deref().unwrap_or("upload"),
        location
    );

    Ok(Json(DetectResponse {
        success: true,
        detections: batch,
    }))
}
