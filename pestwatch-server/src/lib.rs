//! # PestWatch Detection Server Library (pestwatch-server)
//!
//! Counts pests in uploaded images and mirrors the running totals into a
//! spreadsheet.
//!
//! **Architecture:** upload -> validation -> detector adapter -> aggregator;
//! a background synchronizer flushes the aggregator to the `.xlsx`
//! document on a fixed period.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod aggregator;
pub mod api;
pub mod config;
pub mod detector;
pub mod error;
pub mod scan;
pub mod server;
pub mod sheet;
pub mod sync;
pub mod validation;

pub use aggregator::{DetectionAggregator, PestRecord};
pub use detector::{DetectionBatch, PestModel};
pub use error::{Error, Result};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Cumulative counts, shared with the synchronizer
    pub aggregator: Arc<DetectionAggregator>,
    /// Model selected at startup
    pub model: Arc<PestModel>,
    /// Location recorded when an upload does not name one
    pub default_location: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Create new application state with default location and upload limit
    pub fn new(aggregator: Arc<DetectionAggregator>, model: Arc<PestModel>) -> Self {
        Self {
            aggregator,
            model,
            default_location: pestwatch_common::DEFAULT_LOCATION.to_string(),
            max_upload_bytes: config::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_default_location(mut self, location: impl Into<String>) -> Self {
        self.default_location = location.into();
        self
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }
}

/// Build application router
///
/// No authentication; every route is public.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/detect", post(api::detect))
        .route("/counts", get(api::counts))
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
