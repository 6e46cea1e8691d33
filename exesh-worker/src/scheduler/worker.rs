//! Worker
//!
//! Shared state is the local job queue, the buffer of finished results and
//! a counter of free slots. One heartbeat duty fills the queue and drains
//! the buffer; slot duties move jobs from the queue to the buffer.

use anyhow::{Context, Result};
use exesh_core::domain::{Job, JobResult};
use exesh_core::dto::heartbeat::HeartbeatRequest;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use super::HeartbeatClient;
use crate::executor::JobExecutor;
use crate::provider::SourceProvider;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_id: String,
    pub slots: usize,
    pub heartbeat_interval: Duration,
    /// Longest silence while every slot is busy
    pub keepalive_interval: Duration,
    pub slot_interval: Duration,
}

pub struct Worker {
    settings: WorkerSettings,
    client: Arc<dyn HeartbeatClient>,
    sources: Arc<SourceProvider>,
    executor: Arc<dyn JobExecutor>,
    queue: Mutex<VecDeque<Job>>,
    done: Mutex<Vec<JobResult>>,
    free_slots: AtomicUsize,
    last_exchange: Mutex<Option<Instant>>,
}

impl Worker {
    pub fn new(
        settings: WorkerSettings,
        client: Arc<dyn HeartbeatClient>,
        sources: Arc<SourceProvider>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        let free_slots = AtomicUsize::new(settings.slots);
        Self {
            settings,
            client,
            sources,
            executor,
            queue: Mutex::new(VecDeque::new()),
            done: Mutex::new(Vec::new()),
            free_slots,
            last_exchange: Mutex::new(None),
        }
    }

    /// Runs the slot duties in the background and the heartbeat duty here
    pub async fn run(self: Arc<Self>) {
        info!(
            "Starting worker {} with {} slot(s)",
            self.settings.worker_id, self.settings.slots
        );

        for slot in 0..self.settings.slots {
            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                let mut interval = time::interval(worker.settings.slot_interval);
                loop {
                    interval.tick().await;
                    if worker.slot_once().await {
                        debug!("Slot {} finished a job", slot);
                    }
                }
            });
        }

        let mut interval = time::interval(self.settings.heartbeat_interval);
        loop {
            interval.tick().await;

            match self.heartbeat_once().await {
                Ok(received) => {
                    if received > 0 {
                        info!(
                            "Received {} job(s), {} queued, {} slot(s) free",
                            received,
                            self.queued(),
                            self.free_slots()
                        );
                    }
                }
                Err(e) => {
                    error!("Error during heartbeat cycle: {:#}", e);
                }
            }
        }
    }

    /// One exchange with the coordinator; returns how many jobs came back
    pub async fn heartbeat_once(&self) -> Result<usize> {
        let queued = lock(&self.queue).len();
        let free_slots = self.free_slots.load(Ordering::SeqCst).saturating_sub(queued);

        if free_slots == 0 {
            return self.keepalive().await;
        }

        let done_jobs = std::mem::take(&mut *lock(&self.done));
        let req = HeartbeatRequest {
            worker_id: self.settings.worker_id.clone(),
            done_jobs,
            free_slots,
        };

        let response = match self.client.heartbeat(&req).await {
            Ok(response) => response,
            Err(e) => {
                // keep reporting order: unsent results go before newer ones
                let mut done = lock(&self.done);
                let newer = std::mem::take(&mut *done);
                *done = req.done_jobs;
                done.extend(newer);
                return Err(e).context("Failed to send heartbeat");
            }
        };
        self.touch();

        if !req.done_jobs.is_empty() {
            debug!("Reported {} result(s)", req.done_jobs.len());
        }

        for source in &response.sources {
            // a job missing its source fails on its own
            if let Err(e) = self.sources.materialize(source) {
                warn!("Failed to materialize source {}: {}", source.id(), e);
            }
        }

        let received = response.jobs.len();
        lock(&self.queue).extend(response.jobs);
        Ok(received)
    }

    async fn keepalive(&self) -> Result<usize> {
        let due = match *lock(&self.last_exchange) {
            Some(at) => at.elapsed() >= self.settings.keepalive_interval,
            None => true,
        };
        if !due {
            return Ok(0);
        }

        let req = HeartbeatRequest {
            worker_id: self.settings.worker_id.clone(),
            done_jobs: Vec::new(),
            free_slots: 0,
        };
        let response = self
            .client
            .heartbeat(&req)
            .await
            .context("Failed to send keepalive")?;
        self.touch();
        debug!("Sent keepalive");

        if !response.jobs.is_empty() {
            warn!(
                "Coordinator sent {} job(s) to a busy worker",
                response.jobs.len()
            );
            for source in &response.sources {
                if let Err(e) = self.sources.materialize(source) {
                    warn!("Failed to materialize source {}: {}", source.id(), e);
                }
            }
            let received = response.jobs.len();
            lock(&self.queue).extend(response.jobs);
            return Ok(received);
        }
        Ok(0)
    }

    /// Runs one queued job on a free slot; false when there was nothing to do
    pub async fn slot_once(&self) -> bool {
        let taken = self
            .free_slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if taken.is_err() {
            return false;
        }

        let job = lock(&self.queue).pop_front();
        let Some(job) = job else {
            self.free_slots.fetch_add(1, Ordering::SeqCst);
            return false;
        };

        debug!("Running job {} ({})", job.id(), job.kind());
        let result = self.executor.execute(&job).await;
        lock(&self.done).push(result);
        self.free_slots.fetch_add(1, Ordering::SeqCst);
        true
    }

    pub fn free_slots(&self) -> usize {
        self.free_slots.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    fn touch(&self) {
        *lock(&self.last_exchange) = Some(Instant::now());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
