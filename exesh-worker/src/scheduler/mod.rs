//! Worker runtime loop
//!
//! The worker trades results for jobs with the coordinator on a heartbeat
//! and runs the jobs it gets on a fixed number of slots.

pub mod worker;

pub use worker::{Worker, WorkerSettings};

use async_trait::async_trait;
use exesh_client::{ClientError, CoordinatorClient};
use exesh_core::dto::heartbeat::{HeartbeatRequest, HeartbeatResponse};

/// The coordinator as seen by the heartbeat duty
#[async_trait]
pub trait HeartbeatClient: Send + Sync {
    async fn heartbeat(&self, req: &HeartbeatRequest) -> Result<HeartbeatResponse, ClientError>;
}

#[async_trait]
impl HeartbeatClient for CoordinatorClient {
    async fn heartbeat(&self, req: &HeartbeatRequest) -> Result<HeartbeatResponse, ClientError> {
        CoordinatorClient::heartbeat(self, req).await
    }
}
