//! Execution API Handlers
//!
//! HTTP endpoints for submitting and inspecting executions.

use axum::{
    Json,
    extract::{Path, State},
};
use exesh_core::domain::{Execution, ExecutionId};
use exesh_core::dto::execution::{ExecuteRequest, ExecuteResponse};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::execution_service;

/// POST /execute
/// Validate and store a new execution
pub async fn execute(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<Json<ExecuteResponse>> {
    tracing::info!("Submitting execution with {} stage(s)", req.stages.len());

    let execution = execution_service::submit(state.store.as_ref(), req).await?;

    Ok(Json(ExecuteResponse {
        execution_id: execution.id,
    }))
}

/// GET /execution/{id}
/// Get an execution record by ID
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Execution>> {
    tracing::debug!("Getting execution: {}", id);

    let execution = execution_service::get_execution(state.store.as_ref(), ExecutionId(id)).await?;
    Ok(Json(execution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiError;
    use crate::factory::tests::compile_and_run;
    use crate::metrics::Metrics;
    use crate::pool::WorkerPool;
    use crate::registry::ArtifactRegistry;
    use crate::repository::InMemoryStore;
    use crate::scheduler::JobScheduler;
    use crate::service::HeartbeatService;
    use exesh_core::domain::ExecutionStatus;
    use std::sync::Arc;
    use std::time::Duration;

    fn state() -> AppState {
        let (pool, _expired) = WorkerPool::new(Duration::from_secs(60));
        let pool = Arc::new(pool);
        let registry = Arc::new(ArtifactRegistry::new(Arc::clone(&pool)));
        let heartbeat = HeartbeatService::new(
            pool,
            Arc::new(JobScheduler::new()),
            registry,
            Duration::from_secs(60),
        );
        AppState {
            store: Arc::new(InMemoryStore::new()),
            heartbeat: Arc::new(heartbeat),
            metrics: Arc::new(Metrics::new().unwrap()),
        }
    }

    #[tokio::test]
    async fn test_execute_then_get() {
        let state = state();
        let (sources, stages) = compile_and_run();

        let Json(created) = execute(State(state.clone()), Json(ExecuteRequest { sources, stages }))
            .await
            .unwrap();
        let Json(execution) = get_execution(State(state), Path(created.execution_id.0))
            .await
            .unwrap();

        assert_eq!(execution.id, created.execution_id);
        assert_eq!(execution.status, ExecutionStatus::New);
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_definitions() {
        let (_, stages) = compile_and_run();
        let result = execute(
            State(state()),
            Json(ExecuteRequest {
                sources: Vec::new(),
                stages,
            }),
        )
        .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_get_unknown_execution() {
        let result = get_execution(State(state()), Path(Uuid::new_v4())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
