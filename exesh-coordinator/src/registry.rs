//! Artifact Registry
//!
//! Remembers which worker holds the artifact of each finished job and until
//! when it is kept, so consumers can be told where to download it from.

use exesh_core::domain::JobId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::pool::WorkerPool;

pub struct ArtifactRegistry {
    pool: Arc<WorkerPool>,
    /// worker -> job -> trash time
    artifacts: Mutex<HashMap<String, HashMap<JobId, Instant>>>,
}

impl ArtifactRegistry {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            artifacts: Mutex::new(HashMap::new()),
        }
    }

    /// Records that `worker_id` keeps the artifact of `job_id` for `ttl`
    pub fn register(&self, worker_id: &str, job_id: &JobId, ttl: Duration) {
        let trash_at = Instant::now() + ttl;
        let mut artifacts = self.lock();
        let jobs = artifacts.entry(worker_id.to_string()).or_default();
        let entry = jobs.entry(job_id.clone()).or_insert(trash_at);
        if *entry < trash_at {
            *entry = trash_at;
        }
    }

    /// A live worker holding an unexpired copy of the artifact of `job_id`
    ///
    /// Prefers the copy that will be kept the longest.
    pub fn locate(&self, job_id: &JobId) -> Option<String> {
        let now = Instant::now();
        let mut artifacts = self.lock();

        // drop expired entries while looking
        for jobs in artifacts.values_mut() {
            jobs.retain(|_, trash_at| *trash_at > now);
        }
        artifacts.retain(|_, jobs| !jobs.is_empty());

        artifacts
            .iter()
            .filter(|(worker, _)| self.pool.is_alive(worker))
            .filter_map(|(worker, jobs)| jobs.get(job_id).map(|trash_at| (worker, *trash_at)))
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(worker, _)| worker.clone())
    }

    /// Drops everything known about `worker_id`
    pub fn forget_worker(&self, worker_id: &str) {
        self.lock().remove(worker_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<JobId, Instant>>> {
        self.artifacts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn setup() -> (Arc<WorkerPool>, ArtifactRegistry) {
        let (pool, _expired) = WorkerPool::new(Duration::from_secs(3600));
        let pool = Arc::new(pool);
        let registry = ArtifactRegistry::new(Arc::clone(&pool));
        (pool, registry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_only_live_workers() {
        let (pool, registry) = setup();
        let job = JobId::new("j");

        registry.register("dead", &job, TTL);
        assert_eq!(registry.locate(&job), None);

        pool.heartbeat("alive");
        registry.register("alive", &job, TTL);
        assert_eq!(registry.locate(&job).as_deref(), Some("alive"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_artifacts_are_not_located() {
        let (pool, registry) = setup();
        let job = JobId::new("j");
        pool.heartbeat("w1");
        registry.register("w1", &job, TTL);

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert_eq!(registry.locate(&job), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefers_longest_kept_copy() {
        let (pool, registry) = setup();
        let job = JobId::new("j");
        pool.heartbeat("short");
        pool.heartbeat("long");

        registry.register("short", &job, TTL);
        registry.register("long", &job, TTL * 2);
        assert_eq!(registry.locate(&job).as_deref(), Some("long"));

        registry.forget_worker("long");
        assert_eq!(registry.locate(&job).as_deref(), Some("short"));
    }
}
