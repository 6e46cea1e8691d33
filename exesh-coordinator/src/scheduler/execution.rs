//! Execution scheduler
//!
//! Admits stored executions under a concurrency cap and runs one driver task
//! per admitted execution. The driver owns the execution's stage graph: it
//! hands ready jobs to the [`JobScheduler`], waits for their results and
//! persists every transition together with the messages it produces.

use chrono::Utc;
use prometheus::IntGauge;
use exesh_core::domain::{
    BucketId, Execution, Input, Job, JobId, JobResult, Message, Source, SourceId,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::factory::{self, ExecutionPlan};
use crate::graph::StageGraph;
use crate::registry::ArtifactRegistry;
use crate::repository::{ExecutionRepository, RepositoryError};
use crate::scheduler::JobScheduler;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub max_concurrency: usize,
    /// A scheduled execution not saved for this long is claimed again
    pub retry_after: Duration,
}

pub struct ExecutionScheduler {
    store: Arc<dyn ExecutionRepository>,
    jobs: Arc<JobScheduler>,
    registry: Arc<ArtifactRegistry>,
    settings: SchedulerSettings,
    running: Arc<AtomicUsize>,
    in_flight: IntGauge,
}

impl ExecutionScheduler {
    pub fn new(
        store: Arc<dyn ExecutionRepository>,
        jobs: Arc<JobScheduler>,
        registry: Arc<ArtifactRegistry>,
        in_flight: IntGauge,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            jobs,
            registry,
            settings,
            running: Arc::new(AtomicUsize::new(0)),
            in_flight,
        }
    }

    /// Starts the admission loop
    pub async fn run(&self) {
        info!(
            "Starting execution scheduler (interval: {:?}, max concurrency: {})",
            self.settings.poll_interval, self.settings.max_concurrency
        );

        let mut interval = time::interval(self.settings.poll_interval);

        loop {
            interval.tick().await;

            match self.admit_once().await {
                Ok(true) => debug!("Admitted an execution"),
                Ok(false) => {}
                Err(e) => error!("Error during admission cycle: {}", e),
            }
        }
    }

    /// Claims at most one execution and spawns its driver
    ///
    /// Returns false when the cap is reached or nothing is waiting.
    pub async fn admit_once(&self) -> Result<bool, RepositoryError> {
        let Some(slot) = ExecutionSlot::try_acquire(
            &self.running,
            &self.in_flight,
            self.settings.max_concurrency,
        ) else {
            debug!("All {} execution slots busy", self.settings.max_concurrency);
            return Ok(false);
        };

        let now = Utc::now();
        let retry_after = chrono::Duration::from_std(self.settings.retry_after)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let Some(execution) = self.store.claim_for_schedule(now - retry_after, now).await? else {
            return Ok(false);
        };

        info!("Scheduling execution {}", execution.id);
        let driver = Driver::new(
            Arc::clone(&self.store),
            Arc::clone(&self.jobs),
            Arc::clone(&self.registry),
            execution,
            self.settings.retry_after / 2,
        );
        tokio::spawn(async move {
            driver.run().await;
            drop(slot);
        });

        Ok(true)
    }

    /// Executions currently driven
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

/// One unit of the concurrency cap, released on drop
struct ExecutionSlot {
    running: Arc<AtomicUsize>,
    in_flight: IntGauge,
}

impl ExecutionSlot {
    fn try_acquire(running: &Arc<AtomicUsize>, in_flight: &IntGauge, max: usize) -> Option<Self> {
        running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()?;
        in_flight.inc();
        Some(Self {
            running: Arc::clone(running),
            in_flight: in_flight.clone(),
        })
    }
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.in_flight.dec();
    }
}

// =============================================================================
// Driver
// =============================================================================

#[derive(Debug, Error)]
enum DriveError {
    #[error("{0}")]
    Construction(String),

    #[error("artifact of job {0} is not available on any live worker")]
    MissingArtifact(JobId),

    #[error("source {0} is not part of the execution")]
    MissingSource(SourceId),

    #[error("job {job} failed: {error}")]
    JobFailed { job: JobId, error: String },

    #[error("no job is running but the stages are not complete")]
    Stalled,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

struct Driver {
    store: Arc<dyn ExecutionRepository>,
    jobs: Arc<JobScheduler>,
    registry: Arc<ArtifactRegistry>,
    execution: Execution,
    /// How often the claim is renewed while waiting for results
    refresh_every: Duration,
}

impl Driver {
    fn new(
        store: Arc<dyn ExecutionRepository>,
        jobs: Arc<JobScheduler>,
        registry: Arc<ArtifactRegistry>,
        execution: Execution,
        refresh_every: Duration,
    ) -> Self {
        Self {
            store,
            jobs,
            registry,
            execution,
            refresh_every: refresh_every.max(Duration::from_millis(1)),
        }
    }

    async fn run(mut self) {
        let id = self.execution.id;

        let error = match self.drive().await {
            Ok(()) => None,
            Err(DriveError::Repository(e)) => {
                // left scheduled; reclaimed once retry_after passes
                error!("Execution {} abandoned: {}", id, e);
                return;
            }
            Err(e) => {
                warn!("Execution {} failed: {}", id, e);
                Some(e.to_string())
            }
        };

        if let Err(e) = self.finish(error).await {
            error!("Failed to finish execution {}: {}", id, e);
        }
    }

    async fn drive(&mut self) -> Result<(), DriveError> {
        let plan = factory::plan(&self.execution.sources, &self.execution.stages)
            .map_err(|e| DriveError::Construction(e.to_string()))?;
        let mut graph = StageGraph::build(plan.stages.clone())
            .map_err(|e| DriveError::Construction(e.to_string()))?;

        self.save(vec![Message::ExecutionStarted {
            execution_id: self.execution.id,
        }])
        .await?;

        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<JobResult>();
        let mut completed: HashMap<JobId, JobResult> = HashMap::new();
        let mut scheduled: HashSet<JobId> = HashSet::new();
        let mut replay: VecDeque<JobResult> = VecDeque::new();
        let mut in_flight = 0usize;

        let mut refresh = time::interval(self.refresh_every);
        refresh.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        refresh.tick().await;

        while !graph.is_done() {
            for job in graph.pick_ready() {
                if let Some(result) = completed.get(job.id()) {
                    replay.push_back(result.clone());
                    continue;
                }
                if !scheduled.insert(job.id().clone()) {
                    continue;
                }

                let sources = self.job_sources(&plan, &job)?;
                let tx = results_tx.clone();
                self.jobs.schedule(
                    job,
                    sources,
                    Box::new(move |result| {
                        let _ = tx.send(result);
                    }),
                );
                in_flight += 1;
            }

            let (result, fresh) = match replay.pop_front() {
                Some(result) => (result, false),
                None if in_flight == 0 => return Err(DriveError::Stalled),
                None => loop {
                    tokio::select! {
                        received = results_rx.recv() => match received {
                            Some(result) => {
                                in_flight -= 1;
                                break (result, true);
                            }
                            None => return Err(DriveError::Stalled),
                        },
                        _ = refresh.tick() => {
                            // keeps the claim from being taken over while jobs run
                            self.save(Vec::new()).await?;
                        }
                    }
                },
            };

            if let Some(error) = result.error() {
                return Err(DriveError::JobFailed {
                    job: result.job_id().clone(),
                    error: error.to_string(),
                });
            }

            if fresh {
                debug!(
                    "Execution {}: job {} finished with {}",
                    self.execution.id,
                    result.job_id(),
                    result.status()
                );
                let messages = plan
                    .job_names(result.job_id())
                    .iter()
                    .map(|name| Message::for_result(self.execution.id, name, &result))
                    .collect();
                self.save(messages).await?;
                completed.insert(result.job_id().clone(), result.clone());
            }

            graph.mark_done(result.job_id(), result.status());
        }

        Ok(())
    }

    /// Sources a worker needs to resolve every input of `job`
    fn job_sources(&self, plan: &ExecutionPlan, job: &Job) -> Result<Vec<Source>, DriveError> {
        let mut sources = Vec::new();
        for input in job.inputs() {
            let source = match input {
                Input::Artifact { job_id, file } => {
                    let worker = self
                        .registry
                        .locate(job_id)
                        .ok_or_else(|| DriveError::MissingArtifact(job_id.clone()))?;
                    Source::FilestorageBucketFile {
                        id: input.source_id(),
                        bucket_id: BucketId::from(job_id),
                        file: file.clone(),
                        download_endpoint: worker,
                    }
                }
                Input::Inline { source_id } | Input::FilestorageBucketFile { source_id } => plan
                    .source(source_id)
                    .cloned()
                    .ok_or_else(|| DriveError::MissingSource(source_id.clone()))?,
            };
            if !sources.iter().any(|s: &Source| s.id() == source.id()) {
                sources.push(source);
            }
        }
        Ok(sources)
    }

    async fn save(&mut self, messages: Vec<Message>) -> Result<(), RepositoryError> {
        self.execution.touch(Utc::now());
        self.store.save(&self.execution, &messages).await
    }

    async fn finish(&mut self, error: Option<String>) -> Result<(), RepositoryError> {
        self.execution.set_finished(Utc::now());
        info!("Execution {} finished", self.execution.id);
        let message = Message::ExecutionFinished {
            execution_id: self.execution.id,
            error,
        };
        self.store.save(&self.execution, &[message]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::tests::compile_and_run;
    use crate::metrics::Metrics;
    use crate::pool::WorkerPool;
    use crate::repository::InMemoryStore;
    use exesh_core::domain::{ExecutionId, ExecutionStatus, JobStatus};

    const TTL: Duration = Duration::from_secs(600);

    struct Harness {
        store: Arc<InMemoryStore>,
        jobs: Arc<JobScheduler>,
        pool: Arc<WorkerPool>,
        registry: Arc<ArtifactRegistry>,
        metrics: Metrics,
        scheduler: ExecutionScheduler,
    }

    fn harness(max_concurrency: usize) -> Harness {
        harness_with_retry(max_concurrency, Duration::from_secs(60))
    }

    fn harness_with_retry(max_concurrency: usize, retry_after: Duration) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let jobs = Arc::new(JobScheduler::new());
        let (pool, _expired) = WorkerPool::new(Duration::from_secs(3600));
        let pool = Arc::new(pool);
        let registry = Arc::new(ArtifactRegistry::new(Arc::clone(&pool)));
        let metrics = Metrics::new().unwrap();
        let scheduler = ExecutionScheduler::new(
            store.clone(),
            Arc::clone(&jobs),
            Arc::clone(&registry),
            metrics.executions_in_flight.clone(),
            SchedulerSettings {
                poll_interval: Duration::from_millis(10),
                max_concurrency,
                retry_after,
            },
        );
        Harness {
            store,
            jobs,
            pool,
            registry,
            metrics,
            scheduler,
        }
    }

    async fn submit(h: &Harness) -> ExecutionId {
        let (sources, stages) = compile_and_run();
        let execution = Execution::new(sources, stages);
        h.store.create(&execution).await.unwrap();
        execution.id
    }

    async fn next_job(h: &Harness, worker: &str) -> (Job, Vec<Source>) {
        for _ in 0..200 {
            if let Some(picked) = h.jobs.pick_job(worker) {
                return picked;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no job was scheduled");
    }

    /// What the heartbeat service does with a reported result
    fn report(h: &Harness, worker: &str, result: JobResult) {
        h.pool.heartbeat(worker);
        if result.is_ok() {
            h.registry.register(worker, result.job_id(), TTL);
        }
        h.jobs.complete_job(worker, result);
    }

    async fn wait_finished(h: &Harness, id: ExecutionId) -> Execution {
        for _ in 0..200 {
            let execution = h.store.get(id).await.unwrap().unwrap();
            if execution.is_finished() {
                return execution;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        panic!("execution did not finish");
    }

    #[tokio::test]
    async fn test_compile_then_run_end_to_end() {
        let h = harness(4);
        let id = submit(&h).await;
        assert!(h.scheduler.admit_once().await.unwrap());

        let (compile, sources) = next_job(&h, "w1").await;
        assert!(matches!(compile, Job::CompileCpp(_)));
        assert_eq!(sources.len(), 1);
        report(&h, "w1", JobResult::compile(compile.id().clone(), JobStatus::OK, None));

        let (run, sources) = next_job(&h, "w2").await;
        assert!(matches!(run, Job::RunCpp(_)));
        let artifact = sources
            .iter()
            .find_map(|source| match source {
                Source::FilestorageBucketFile {
                    bucket_id,
                    file,
                    download_endpoint,
                    ..
                } => Some((bucket_id.clone(), file.clone(), download_endpoint.clone())),
                Source::Inline { .. } => None,
            })
            .unwrap();
        assert_eq!(
            artifact,
            (BucketId::from(compile.id()), "a.out".to_string(), "w1".to_string())
        );
        report(
            &h,
            "w2",
            JobResult::run(run.id().clone(), JobStatus::OK, Some("3\n".to_string())),
        );

        let execution = wait_finished(&h, id).await;
        assert_eq!(execution.status, ExecutionStatus::Finished);

        let messages = h.store.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], Message::ExecutionStarted { execution_id: id });
        assert!(matches!(
            &messages[1],
            Message::CompileJob { job_name, status: JobStatus::OK, .. } if job_name == "compile"
        ));
        assert!(matches!(
            &messages[2],
            Message::RunJob { job_name, output: Some(out), .. } if job_name == "run" && out == "3\n"
        ));
        assert_eq!(
            messages[3],
            Message::ExecutionFinished {
                execution_id: id,
                error: None
            }
        );
    }

    #[tokio::test]
    async fn test_compilation_error_stops_execution() {
        let h = harness(4);
        let id = submit(&h).await;
        h.scheduler.admit_once().await.unwrap();

        let (compile, _) = next_job(&h, "w1").await;
        report(
            &h,
            "w1",
            JobResult::compile(
                compile.id().clone(),
                JobStatus::CE,
                Some("error: expected ';'".to_string()),
            ),
        );

        wait_finished(&h, id).await;
        assert!(h.jobs.pick_job("w1").is_none());

        let messages = h.store.messages();
        assert_eq!(messages.len(), 3);
        assert!(matches!(
            &messages[1],
            Message::CompileJob { status: JobStatus::CE, compilation_error: Some(_), .. }
        ));
        assert!(matches!(
            &messages[2],
            Message::ExecutionFinished { error: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_execution() {
        let h = harness(4);
        let id = submit(&h).await;
        h.scheduler.admit_once().await.unwrap();

        // reported OK but never registered anywhere
        let (compile, _) = next_job(&h, "w1").await;
        h.jobs.complete_job(
            "w1",
            JobResult::compile(compile.id().clone(), JobStatus::OK, None),
        );

        wait_finished(&h, id).await;
        let messages = h.store.messages();
        assert!(matches!(
            messages.last(),
            Some(Message::ExecutionFinished { error: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_infrastructure_error_fails_execution() {
        let h = harness(4);
        let id = submit(&h).await;
        h.scheduler.admit_once().await.unwrap();

        let (compile, _) = next_job(&h, "w1").await;
        report(&h, "w1", JobResult::failed(&compile, "podman is gone"));

        wait_finished(&h, id).await;
        let messages = h.store.messages();
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[1],
            Message::ExecutionFinished { error: Some(e), .. } if e.contains("podman is gone")
        ));
    }

    #[tokio::test]
    async fn test_admission_respects_cap() {
        let h = harness(1);
        submit(&h).await;
        submit(&h).await;

        assert!(h.scheduler.admit_once().await.unwrap());
        assert_eq!(h.scheduler.running(), 1);
        assert_eq!(h.metrics.executions_in_flight.get(), 1);
        assert!(!h.scheduler.admit_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_running_execution_is_not_claimed_again() {
        let h = harness_with_retry(4, Duration::from_millis(100));
        let id = submit(&h).await;
        assert!(h.scheduler.admit_once().await.unwrap());

        // the compile job outlives retry_after several times over
        let (compile, _) = next_job(&h, "w1").await;
        time::sleep(Duration::from_millis(400)).await;
        assert!(!h.scheduler.admit_once().await.unwrap());
        assert_eq!(h.scheduler.running(), 1);

        report(
            &h,
            "w1",
            JobResult::compile(compile.id().clone(), JobStatus::CE, Some("nope".to_string())),
        );
        wait_finished(&h, id).await;

        let started = h
            .store
            .messages()
            .iter()
            .filter(|m| matches!(m, Message::ExecutionStarted { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_nothing_to_admit_releases_slot() {
        let h = harness(1);
        assert!(!h.scheduler.admit_once().await.unwrap());
        assert_eq!(h.scheduler.running(), 0);
    }

    #[tokio::test]
    async fn test_invalid_execution_finishes_with_error() {
        let h = harness(1);
        let (sources, mut stages) = compile_and_run();
        stages[0].deps.push("missing".to_string());
        let execution = Execution::new(sources, stages);
        h.store.create(&execution).await.unwrap();

        h.scheduler.admit_once().await.unwrap();
        wait_finished(&h, execution.id).await;

        let messages = h.store.messages();
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0],
            Message::ExecutionFinished { error: Some(_), .. }
        ));
    }

    #[test]
    fn test_slot_is_released_on_drop() {
        let running = Arc::new(AtomicUsize::new(0));
        let gauge = IntGauge::new("slots", "slots").unwrap();
        let first = ExecutionSlot::try_acquire(&running, &gauge, 2).unwrap();
        let second = ExecutionSlot::try_acquire(&running, &gauge, 2).unwrap();
        assert!(ExecutionSlot::try_acquire(&running, &gauge, 2).is_none());
        assert_eq!(gauge.get(), 2);

        drop(first);
        assert_eq!(running.load(Ordering::SeqCst), 1);
        drop(second);
        assert_eq!(running.load(Ordering::SeqCst), 0);
        assert_eq!(gauge.get(), 0);
    }
}
