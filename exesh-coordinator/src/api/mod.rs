//! API Module
//!
//! HTTP API layer for the coordinator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod execution;
pub mod health;
pub mod heartbeat;
pub mod metrics;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::metrics::Metrics;
use crate::repository::ExecutionRepository;
use crate::service::HeartbeatService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ExecutionRepository>,
    pub heartbeat: Arc<HeartbeatService>,
    pub metrics: Arc<Metrics>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics))
        // Execution endpoints
        .route("/execute", post(execution::execute))
        .route("/execution/{id}", get(execution::get_execution))
        // Worker endpoints
        .route("/heartbeat", post(heartbeat::heartbeat))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
