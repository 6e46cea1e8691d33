//! Heartbeat Service
//!
//! Handles the periodic worker report: liveness, finished jobs and the pull
//! of new work.

use exesh_core::dto::heartbeat::{HeartbeatRequest, HeartbeatResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::pool::WorkerPool;
use crate::registry::ArtifactRegistry;
use crate::scheduler::JobScheduler;

pub struct HeartbeatService {
    pool: Arc<WorkerPool>,
    jobs: Arc<JobScheduler>,
    registry: Arc<ArtifactRegistry>,
    /// How long workers keep the artifacts they produce
    artifact_ttl: Duration,
}

impl HeartbeatService {
    pub fn new(
        pool: Arc<WorkerPool>,
        jobs: Arc<JobScheduler>,
        registry: Arc<ArtifactRegistry>,
        artifact_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            jobs,
            registry,
            artifact_ttl,
        }
    }

    pub fn heartbeat(&self, req: HeartbeatRequest) -> HeartbeatResponse {
        let worker_id = req.worker_id;
        self.pool.heartbeat(&worker_id);

        for result in req.done_jobs {
            // consumers scheduled by the callback must be able to locate it
            if result.is_ok() {
                self.registry
                    .register(&worker_id, result.job_id(), self.artifact_ttl);
            }
            self.jobs.complete_job(&worker_id, result);
        }

        let mut response = HeartbeatResponse::default();
        for _ in 0..req.free_slots {
            let Some((job, sources)) = self.jobs.pick_job(&worker_id) else {
                break;
            };
            response.push(job, sources);
        }

        if !response.is_empty() {
            debug!(
                "Handing {} job(s) to worker {}",
                response.jobs.len(),
                worker_id
            );
        }
        response
    }

    /// Workers that reported within their deadline
    pub fn alive_workers(&self) -> usize {
        self.pool.alive_workers().len()
    }
}
