//! Health Check API Handler

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::api::AppState;

/// GET /health
/// Healthy while the storage root is reachable
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match tokio::fs::metadata(state.storage.root()).await {
        Ok(meta) if meta.is_dir() => (StatusCode::OK, "OK"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable"),
    }
}
