//! Job scheduler
//!
//! Queue of ready jobs matched against worker pulls, plus the one-shot
//! completion callbacks registered for them.

use exesh_core::domain::{Job, JobId, JobResult, Source};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Invoked once with the result of the job it was registered for
pub type JobCallback = Box<dyn FnOnce(JobResult) + Send + 'static>;

struct PendingJob {
    job: Job,
    sources: Vec<Source>,
    callbacks: Vec<JobCallback>,
    /// Worker currently holding the job
    worker: Option<String>,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<JobId>,
    pending: HashMap<JobId, PendingJob>,
}

/// FIFO of ready jobs, no worker affinity
#[derive(Default)]
pub struct JobScheduler {
    inner: Mutex<Inner>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `job` and registers `callback` for its result
    ///
    /// A job that is already pending is not queued again; the callback joins
    /// the existing registration.
    pub fn schedule(&self, job: Job, sources: Vec<Source>, callback: JobCallback) {
        let mut inner = self.lock();
        let id = job.id().clone();

        if let Some(pending) = inner.pending.get_mut(&id) {
            debug!("Job {} already pending, attaching callback", id);
            pending.callbacks.push(callback);
            return;
        }

        debug!("Scheduling job {} ({})", id, job.kind());
        inner.pending.insert(
            id.clone(),
            PendingJob {
                job,
                sources,
                callbacks: vec![callback],
                worker: None,
            },
        );
        inner.queue.push_back(id);
    }

    /// Hands the next queued job to `worker_id`
    pub fn pick_job(&self, worker_id: &str) -> Option<(Job, Vec<Source>)> {
        let mut inner = self.lock();
        let Inner { queue, pending } = &mut *inner;

        while let Some(id) = queue.pop_front() {
            let Some(entry) = pending.get_mut(&id) else {
                // completed while still queued
                continue;
            };
            entry.worker = Some(worker_id.to_string());
            debug!("Job {} picked by worker {}", id, worker_id);
            return Some((entry.job.clone(), entry.sources.clone()));
        }

        None
    }

    /// Delivers `result` to the callbacks registered for its job
    ///
    /// Registrations are removed atomically with the lookup, so every callback
    /// runs exactly once. Returns false when nothing was registered, e.g. for
    /// a duplicate report.
    pub fn complete_job(&self, worker_id: &str, result: JobResult) -> bool {
        let entry = self.lock().pending.remove(result.job_id());

        let Some(entry) = entry else {
            debug!(
                "Ignoring result for job {} from worker {}: not pending",
                result.job_id(),
                worker_id
            );
            return false;
        };

        if entry.worker.as_deref() != Some(worker_id) {
            debug!(
                "Job {} completed by worker {} instead of {:?}",
                result.job_id(),
                worker_id,
                entry.worker
            );
        }

        let mut callbacks = entry.callbacks.into_iter().peekable();
        while let Some(callback) = callbacks.next() {
            if callbacks.peek().is_some() {
                callback(result.clone());
            } else {
                callback(result);
                break;
            }
        }
        true
    }

    /// Puts every job held by `worker_id` back at the front of the queue
    pub fn requeue_worker(&self, worker_id: &str) -> usize {
        let mut inner = self.lock();
        let Inner { queue, pending } = &mut *inner;

        let mut lost: Vec<&JobId> = pending
            .iter_mut()
            .filter(|(_, entry)| entry.worker.as_deref() == Some(worker_id))
            .map(|(id, entry)| {
                entry.worker = None;
                id
            })
            .collect();
        lost.sort();

        let count = lost.len();
        for id in lost.into_iter().rev() {
            queue.push_front(id.clone());
        }

        if count > 0 {
            warn!("Requeued {} job(s) lost with worker {}", count, worker_id);
        }
        count
    }

    /// Jobs waiting in the queue
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_pending(&self, job_id: &JobId) -> bool {
        self.lock().pending.contains_key(job_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a poisoned queue is still structurally valid
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
