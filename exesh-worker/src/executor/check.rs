//! Checking a suspect output with a compiled checker

use anyhow::{Context, Result};
use exesh_core::domain::job::CheckJob;
use exesh_core::domain::{Job, JobResult, JobStatus};
use std::sync::Arc;
use std::time::Duration;

use super::{Images, sandbox_path};
use crate::provider::InputProvider;
use crate::runtime::{ExecuteParams, File, Limits, Runtime};

const CHECK_TIME: Duration = Duration::from_secs(10);
const CHECK_MEMORY_MB: u64 = 256;
const CHECK_PROCESSES: u32 = 16;

pub struct CheckExecutor {
    runtime: Arc<dyn Runtime>,
    inputs: Arc<InputProvider>,
    images: Images,
}

impl CheckExecutor {
    pub fn new(runtime: Arc<dyn Runtime>, inputs: Arc<InputProvider>, images: Images) -> Self {
        Self {
            runtime,
            inputs,
            images,
        }
    }

    pub async fn execute(&self, job: &Job) -> Result<JobResult> {
        let Job::CheckCpp(check) = job else {
            anyhow::bail!("check executor cannot run {} jobs", job.kind());
        };
        self.check(check).await
    }

    async fn check(&self, job: &CheckJob) -> Result<JobResult> {
        let checker = self
            .inputs
            .locate(&job.compiled_checker)
            .await
            .context("failed to locate compiled_checker input")?;
        let correct = self
            .inputs
            .locate(&job.correct_output)
            .await
            .context("failed to locate correct_output input")?;
        let suspect = self
            .inputs
            .locate(&job.suspect_output)
            .await
            .context("failed to locate suspect_output input")?;

        let command = vec![
            sandbox_path("checker"),
            sandbox_path("correct.txt"),
            sandbox_path("suspect.txt"),
        ];
        let params = ExecuteParams {
            image: self.images.cpp.clone(),
            limits: Limits {
                memory: Some(CHECK_MEMORY_MB),
                time: Some(CHECK_TIME),
                processes: Some(CHECK_PROCESSES),
            },
            in_files: vec![
                File::new(sandbox_path("checker"), checker.path()),
                File::new(sandbox_path("correct.txt"), correct.path()),
                File::new(sandbox_path("suspect.txt"), suspect.path()),
            ],
            out_files: Vec::new(),
            stdin: None,
            env: Vec::new(),
        };

        let output = self
            .runtime
            .execute(&command, params)
            .await
            .context("failed to run checker")?;

        let status = parse_verdict(&output.stdout)?;
        Ok(JobResult::check(job.id.clone(), status))
    }
}

/// The first token of the checker's output
fn parse_verdict(stdout: &str) -> Result<JobStatus> {
    match stdout.split_whitespace().next() {
        Some("OK") => Ok(JobStatus::OK),
        Some("WA") => Ok(JobStatus::WA),
        Some(other) => anyhow::bail!("unexpected checker verdict {:?}", other),
        None => anyhow::bail!("checker printed no verdict"),
    }
}
