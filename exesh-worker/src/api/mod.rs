//! API Module
//!
//! HTTP surface of a worker: other workers download artifacts from here.

pub mod error;
pub mod filestorage;
pub mod health;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::filestorage::FileStorage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<FileStorage>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/filestorage/{bucket}/{file}", get(filestorage::download))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
