//! Running programs against an input

use anyhow::{Context, Result};
use exesh_core::domain::job::RunJob;
use exesh_core::domain::{Job, JobResult, JobStatus};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{Images, sandbox_path};
use crate::provider::{InputProvider, OutputProvider, ProviderError};
use crate::runtime::{ExecuteParams, File, Limits, Runtime, RuntimeError};

const RUN_PROCESSES: u32 = 16;

pub struct RunExecutor {
    runtime: Arc<dyn Runtime>,
    inputs: Arc<InputProvider>,
    outputs: Arc<OutputProvider>,
    images: Images,
}

impl RunExecutor {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        inputs: Arc<InputProvider>,
        outputs: Arc<OutputProvider>,
        images: Images,
    ) -> Self {
        Self {
            runtime,
            inputs,
            outputs,
            images,
        }
    }

    pub async fn execute(&self, job: &Job) -> Result<JobResult> {
        match job {
            Job::RunCpp(run) => {
                let program = sandbox_path("program");
                self.run(run, &self.images.cpp, vec![program.clone()], program)
                    .await
            }
            Job::RunGo(run) => {
                let program = sandbox_path("program");
                self.run(run, &self.images.go, vec![program.clone()], program)
                    .await
            }
            Job::RunPy(run) => {
                let script = sandbox_path("main.py");
                let command = vec!["python3".to_string(), script.clone()];
                self.run(run, &self.images.python, command, script).await
            }
            other => anyhow::bail!("run executor cannot run {} jobs", other.kind()),
        }
    }

    async fn run(
        &self,
        job: &RunJob,
        image: &str,
        command: Vec<String>,
        program_path: String,
    ) -> Result<JobResult> {
        let program = self
            .inputs
            .locate(&job.program)
            .await
            .context("failed to locate program input")?;
        let stdin = self
            .inputs
            .read(&job.run_input)
            .await
            .context("failed to read run_input input")?;

        let params = ExecuteParams {
            image: image.to_string(),
            limits: Limits {
                memory: Some(job.memory_limit),
                time: Some(Duration::from_millis(job.time_limit)),
                processes: Some(RUN_PROCESSES),
            },
            in_files: vec![File::new(program_path, program.path())],
            out_files: Vec::new(),
            stdin: Some(stdin),
            env: Vec::new(),
        };

        let outcome = self.runtime.execute(&command, params).await;
        drop(program);

        let output = match outcome {
            Ok(output) => output,
            Err(RuntimeError::Timeout) => {
                return Ok(JobResult::run(job.id.clone(), JobStatus::TL, None));
            }
            Err(RuntimeError::OutOfMemory) => {
                return Ok(JobResult::run(job.id.clone(), JobStatus::ML, None));
            }
            Err(RuntimeError::NonZeroExit { code, .. }) => {
                debug!("Job {} exited with code {}", job.id, code);
                return Ok(JobResult::run(job.id.clone(), JobStatus::RE, None));
            }
            Err(e) => return Err(e).context("failed to run program"),
        };

        self.store_output(job, &output.stdout)?;

        let shown = job.show_output.then_some(output.stdout);
        Ok(JobResult::run(job.id.clone(), JobStatus::OK, shown))
    }

    fn store_output(&self, job: &RunJob, stdout: &str) -> Result<()> {
        let mut writer = match self.outputs.create(&job.id, &job.run_output) {
            Ok(writer) => writer,
            // an earlier run of the same job already stored it
            Err(ProviderError::AlreadyExists) => return Ok(()),
            Err(e) => return Err(e).context("failed to create run_output output"),
        };

        if let Err(e) = writer.write_all(stdout.as_bytes()) {
            writer.abort();
            return Err(e).context("failed to write run_output output");
        }
        writer
            .commit()
            .context("failed to commit run_output output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::{FakeRuntime, Fixture};
    use crate::runtime::Output as RunOutput;
    use exesh_core::domain::result::RunResult;
    use exesh_core::domain::{Input, JobId, Output};

    fn run_job(fixture: &Fixture, id: &str, show_output: bool) -> RunJob {
        RunJob {
            id: JobId::new(id),
            success_status: JobStatus::OK,
            program: fixture.inline("print(sum(map(int, input().split())))"),
            run_input: fixture.inline("1 2\n"),
            run_output: Output::new("output.txt"),
            time_limit: 1000,
            memory_limit: 64,
            show_output,
        }
    }

    fn executor(fixture: &Fixture, runtime: Arc<FakeRuntime>) -> RunExecutor {
        RunExecutor::new(
            runtime,
            Arc::clone(&fixture.inputs),
            Arc::clone(&fixture.outputs),
            Images::default(),
        )
    }

    fn run_result(result: JobResult) -> RunResult {
        match result {
            JobResult::Run(run) => run,
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ok_stores_and_shows_output() {
        let fixture = Fixture::new();
        let runtime = FakeRuntime::new(|_, params| {
            assert_eq!(params.stdin.as_deref(), Some("1 2\n"));
            Ok(RunOutput {
                stdout: "3\n".to_string(),
                stderr: String::new(),
            })
        });
        let executor = executor(&fixture, Arc::clone(&runtime));

        let job = run_job(&fixture, "ab12", true);
        let result = run_result(executor.execute(&Job::RunPy(job)).await.unwrap());
        assert_eq!(result.status, JobStatus::OK);
        assert_eq!(result.output.as_deref(), Some("3\n"));

        let stored = Input::Artifact {
            job_id: JobId::new("ab12"),
            file: "output.txt".to_string(),
        };
        assert_eq!(fixture.inputs.read(&stored).await.unwrap(), "3\n");

        let calls = runtime.calls.lock().unwrap();
        let (command, params) = &calls[0];
        assert_eq!(command, &["python3", "/tmp/main.py"]);
        assert_eq!(params.limits.time, Some(Duration::from_secs(1)));
        assert_eq!(params.limits.memory, Some(64));
    }

    #[tokio::test]
    async fn test_output_hidden_unless_requested() {
        let fixture = Fixture::new();
        let executor = executor(&fixture, FakeRuntime::stdout("3\n"));

        let job = run_job(&fixture, "ab12", false);
        let result = run_result(executor.execute(&Job::RunCpp(job)).await.unwrap());
        assert_eq!(result.status, JobStatus::OK);
        assert_eq!(result.output, None);
    }

    #[tokio::test]
    async fn test_limit_violations_map_to_verdicts() {
        let cases: [(fn() -> RuntimeError, JobStatus); 3] = [
            (|| RuntimeError::Timeout, JobStatus::TL),
            (|| RuntimeError::OutOfMemory, JobStatus::ML),
            (
                || RuntimeError::NonZeroExit {
                    code: 1,
                    stdout: String::new(),
                    stderr: "segfault".to_string(),
                },
                JobStatus::RE,
            ),
        ];

        for (error, expected) in cases {
            let fixture = Fixture::new();
            let executor = executor(&fixture, FakeRuntime::failing(error));
            let job = run_job(&fixture, "ab12", true);
            let result = run_result(executor.execute(&Job::RunGo(job)).await.unwrap());
            assert_eq!(result.status, expected);
            assert_eq!(result.output, None);
            assert_eq!(result.error, None);
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let fixture = Fixture::new();
        let executor = executor(&fixture, FakeRuntime::stdout(""));
        let mut job = run_job(&fixture, "ab12", false);
        job.program = Input::Artifact {
            job_id: JobId::new("ffff"),
            file: "a.out".to_string(),
        };

        let error = executor.execute(&Job::RunCpp(job)).await.unwrap_err();
        assert!(format!("{:#}", error).contains("program"));
    }
}
