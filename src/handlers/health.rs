//! Health check endpoint
//!
//! Reports liveness plus the state of the model catalog cache. The handler
//! never triggers a catalog fetch.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Catalog cache state: "empty", "fresh" or "stale"
    pub catalog: &'static str,
    /// Models in the cached catalog (0 before the first fetch)
    pub catalog_models: usize,
    /// "degraded" once any metrics recording has failed, otherwise "operational"
    pub metrics_status: &'static str,
}

/// Health check handler
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let catalog = state.catalog().status().await;
    let catalog_models = state
        .catalog()
        .snapshot()
        .await
        .map(|c| c.len())
        .unwrap_or(0);

    let metrics_status = if state.metrics().metrics_recording_failures_count() > 0 {
        "degraded"
    } else {
        "operational"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            catalog: catalog.as_str(),
            catalog_models,
            metrics_status,
        }),
    )
}
