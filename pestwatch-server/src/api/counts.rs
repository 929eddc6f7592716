//! GET /counts

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::aggregator::PestRecord;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CountsResponse {
    pub records: Vec<PestRecord>,
}

/// Cumulative counts since startup (including seeded rows), sorted by label
pub async fn counts(State(state): State<AppState>) -> Json<CountsResponse> {
    Json(CountsResponse {
        records: state.aggregator.snapshot().await,
    })
}
