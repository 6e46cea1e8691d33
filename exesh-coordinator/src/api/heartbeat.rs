//! Heartbeat API Handler
//!
//! Workers report results and pull new jobs through a single endpoint.

use axum::{Json, extract::State};
use exesh_core::dto::heartbeat::{HeartbeatRequest, HeartbeatResponse};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /heartbeat
/// Record liveness, accept finished jobs and hand out new ones
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<Json<HeartbeatResponse>> {
    if req.worker_id.is_empty() {
        return Err(ApiError::BadRequest("worker_id cannot be empty".to_string()));
    }

    tracing::debug!(
        "Heartbeat from {}: {} result(s), {} free slot(s)",
        req.worker_id,
        req.done_jobs.len(),
        req.free_slots
    );

    Ok(Json(state.heartbeat.heartbeat(req)))
}
