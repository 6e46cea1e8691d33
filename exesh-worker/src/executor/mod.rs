//! Job executors
//!
//! Each executor turns one kind of job into a sandboxed command, maps the
//! sandbox outcome to a verdict and stores what the job produces. Failures of
//! the machinery itself never become verdicts: they yield a result with its
//! `error` set.

pub mod check;
pub mod compile;
pub mod run;

use async_trait::async_trait;
use exesh_core::domain::{Job, JobResult};
use std::sync::Arc;
use tracing::{debug, warn};

pub use check::CheckExecutor;
pub use compile::CompileExecutor;
pub use run::RunExecutor;

use crate::provider::{InputProvider, OutputProvider};
use crate::runtime::{Runtime, WORKDIR};

fn sandbox_path(name: &str) -> String {
    format!("{}/{}", WORKDIR, name)
}

/// Container images per toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Images {
    pub cpp: String,
    pub go: String,
    pub python: String,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            cpp: "docker.io/library/gcc:13".to_string(),
            go: "docker.io/library/golang:1.22".to_string(),
            python: "docker.io/library/python:3.12-slim".to_string(),
        }
    }
}

#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Runs `job` to a result; never fails
    async fn execute(&self, job: &Job) -> JobResult;
}

/// Dispatches every job kind to its executor
pub struct Executors {
    compile: CompileExecutor,
    run: RunExecutor,
    check: CheckExecutor,
}

impl Executors {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        inputs: Arc<InputProvider>,
        outputs: Arc<OutputProvider>,
        images: Images,
    ) -> Self {
        Self {
            compile: CompileExecutor::new(
                Arc::clone(&runtime),
                Arc::clone(&inputs),
                Arc::clone(&outputs),
                images.clone(),
            ),
            run: RunExecutor::new(
                Arc::clone(&runtime),
                Arc::clone(&inputs),
                outputs,
                images.clone(),
            ),
            check: CheckExecutor::new(runtime, inputs, images),
        }
    }
}

#[async_trait]
impl JobExecutor for Executors {
    async fn execute(&self, job: &Job) -> JobResult {
        debug!("Executing job {} ({})", job.id(), job.kind());

        let outcome = match job {
            Job::CompileCpp(_) | Job::CompileGo(_) => self.compile.execute(job).await,
            Job::RunCpp(_) | Job::RunPy(_) | Job::RunGo(_) => self.run.execute(job).await,
            Job::CheckCpp(_) => self.check.execute(job).await,
        };

        match outcome {
            Ok(result) => {
                debug!("Job {} finished with {}", job.id(), result.status());
                result
            }
            Err(e) => {
                warn!("Job {} failed: {:#}", job.id(), e);
                JobResult::failed(job, format!("{:#}", e))
            }
        }
    }
}
