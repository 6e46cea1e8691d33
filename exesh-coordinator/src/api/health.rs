//! Health Check API Handler
//!
//! Liveness probe plus the number of workers currently in the pool.

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::api::AppState;

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "workers": state.heartbeat.alive_workers(),
    }))
}
