//! Heartbeat DTOs

use serde::{Deserialize, Serialize};

use crate::domain::{Job, JobResult, Source};

/// Periodic report a worker sends to the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Worker identifier, also the base URL its artifacts are served from
    pub worker_id: String,

    /// Results completed since the last successful heartbeat
    #[serde(default)]
    pub done_jobs: Vec<JobResult>,

    /// How many more jobs the worker can take
    pub free_slots: usize,
}

/// Work handed to a worker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub jobs: Vec<Job>,

    /// Material the jobs need, deduplicated by id
    pub sources: Vec<Source>,
}

impl HeartbeatResponse {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Adds a job with its sources, skipping sources already present
    pub fn push(&mut self, job: Job, sources: Vec<Source>) {
        for source in sources {
            if !self.sources.iter().any(|s| s.id() == source.id()) {
                self.sources.push(source);
            }
        }
        self.jobs.push(job);
    }
}
