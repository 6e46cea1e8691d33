//! Execution-related API endpoints

use crate::error::Result;
use crate::{CoordinatorClient, handle_response};
use exesh_core::domain::{Execution, ExecutionId};
use exesh_core::dto::execution::{ExecuteRequest, ExecuteResponse};

impl CoordinatorClient {
    /// Submit an execution
    ///
    /// Definitions the coordinator cannot resolve are rejected with a 400
    /// carrying the reason.
    pub async fn execute(&self, req: &ExecuteRequest) -> Result<ExecuteResponse> {
        let url = format!("{}/execute", self.base_url);
        let response = self.client.post(&url).json(req).send().await?;

        handle_response(response).await
    }

    /// Get an execution record by ID
    pub async fn get_execution(&self, id: ExecutionId) -> Result<Execution> {
        let url = format!("{}/execution/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }
}
