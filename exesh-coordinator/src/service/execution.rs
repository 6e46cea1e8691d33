//! Execution Service
//!
//! Validation and storage of submitted executions.

use exesh_core::domain::{Execution, ExecutionId};
use exesh_core::dto::execution::ExecuteRequest;

use crate::factory;
use crate::graph::StageGraph;
use crate::repository::{ExecutionRepository, RepositoryError};

/// Service error type
#[derive(Debug)]
pub enum ExecutionError {
    NotFound(ExecutionId),
    ValidationError(String),
    StorageError(RepositoryError),
}

impl From<RepositoryError> for ExecutionError {
    fn from(err: RepositoryError) -> Self {
        ExecutionError::StorageError(err)
    }
}

/// Validate and store a new execution
///
/// The definitions are planned and their stage graph built up front so that
/// malformed submissions are rejected instead of failing later.
pub async fn submit(
    store: &dyn ExecutionRepository,
    req: ExecuteRequest,
) -> Result<Execution, ExecutionError> {
    if req.stages.is_empty() {
        return Err(ExecutionError::ValidationError(
            "execution has no stages".to_string(),
        ));
    }

    let plan = factory::plan(&req.sources, &req.stages)
        .map_err(|e| ExecutionError::ValidationError(e.to_string()))?;
    StageGraph::build(plan.stages)
        .map_err(|e| ExecutionError::ValidationError(e.to_string()))?;

    let execution = Execution::new(req.sources, req.stages);
    store.create(&execution).await?;

    tracing::info!(
        "Execution created: {} ({} stage(s))",
        execution.id,
        execution.stages.len()
    );

    Ok(execution)
}

/// Get an execution by ID
pub async fn get_execution(
    store: &dyn ExecutionRepository,
    id: ExecutionId,
) -> Result<Execution, ExecutionError> {
    store.get(id).await?.ok_or(ExecutionError::NotFound(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::tests::compile_and_run;
    use crate::repository::InMemoryStore;
    use exesh_core::domain::ExecutionStatus;

    fn request() -> ExecuteRequest {
        let (sources, stages) = compile_and_run();
        ExecuteRequest { sources, stages }
    }

    #[tokio::test]
    async fn test_submit_stores_new_execution() {
        let store = InMemoryStore::new();
        let execution = submit(&store, request()).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::New);

        let stored = get_execution(&store, execution.id).await.unwrap();
        assert_eq!(stored.id, execution.id);
        assert_eq!(stored.stages.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_source() {
        let store = InMemoryStore::new();
        let mut req = request();
        req.sources.remove(0);

        let err = submit(&store, req).await.unwrap_err();
        assert!(matches!(err, ExecutionError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_submit_rejects_stage_cycle() {
        let store = InMemoryStore::new();
        let mut req = request();
        req.stages[0].deps.push("main".to_string());

        let err = submit(&store, req).await.unwrap_err();
        assert!(matches!(err, ExecutionError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_execution() {
        let store = InMemoryStore::new();
        let req = ExecuteRequest {
            sources: Vec::new(),
            stages: Vec::new(),
        };
        assert!(matches!(
            submit(&store, req).await,
            Err(ExecutionError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_get_unknown_execution() {
        let store = InMemoryStore::new();
        let err = get_execution(&store, ExecutionId::new()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::NotFound(_)));
    }
}
