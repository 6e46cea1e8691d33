//! Worker-facing API endpoints

use crate::error::Result;
use crate::{CoordinatorClient, handle_response};
use exesh_core::dto::heartbeat::{HeartbeatRequest, HeartbeatResponse};

impl CoordinatorClient {
    /// Report results and free capacity, receiving new jobs in exchange
    pub async fn heartbeat(&self, req: &HeartbeatRequest) -> Result<HeartbeatResponse> {
        let url = format!("{}/heartbeat", self.base_url);
        let response = self.client.post(&url).json(req).send().await?;

        handle_response(response).await
    }
}
