//! Compilation of C++ and Go programs

use anyhow::{Context, Result};
use exesh_core::domain::job::CompileJob;
use exesh_core::domain::{Job, JobResult, JobStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{Images, sandbox_path};
use crate::provider::{InputProvider, OutputProvider, ProviderError};
use crate::runtime::{ExecuteParams, File, Limits, Runtime, RuntimeError};

const COMPILE_TIME: Duration = Duration::from_secs(20);
const COMPILE_MEMORY_MB: u64 = 1024;
/// Compilers fork helpers and the Go toolchain is heavily threaded
const COMPILE_PROCESSES: u32 = 256;

const BINARY: &str = "program";

pub struct CompileExecutor {
    runtime: Arc<dyn Runtime>,
    inputs: Arc<InputProvider>,
    outputs: Arc<OutputProvider>,
    images: Images,
}

struct Toolchain {
    image: String,
    source_file: &'static str,
    command: Vec<String>,
    env: Vec<(String, String)>,
}

impl CompileExecutor {
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
        let (compile, toolchain) = match job {
            Job::CompileCpp(compile) => (compile, self.cpp()),
            Job::CompileGo(compile) => (compile, self.go()),
            other => anyhow::bail!("compile executor cannot run {} jobs", other.kind()),
        };
        self.compile(compile, toolchain).await
    }

    async fn compile(&self, job: &CompileJob, toolchain: Toolchain) -> Result<JobResult> {
        let code = self
            .inputs
            .locate(&job.code)
            .await
            .context("failed to locate code input")?;

        let reservation = match self.outputs.reserve(&job.id, &job.compiled_code) {
            Ok(reservation) => reservation,
            Err(ProviderError::AlreadyExists) => {
                debug!("Job {} already compiled here", job.id);
                return Ok(JobResult::compile(job.id.clone(), JobStatus::OK, None));
            }
            Err(e) => return Err(e).context("failed to reserve compiled_code output"),
        };

        let params = ExecuteParams {
            image: toolchain.image,
            limits: Limits {
                memory: Some(COMPILE_MEMORY_MB),
                time: Some(COMPILE_TIME),
                processes: Some(COMPILE_PROCESSES),
            },
            in_files: vec![File::new(sandbox_path(toolchain.source_file), code.path())],
            out_files: vec![File::new(sandbox_path(BINARY), reservation.path())],
            stdin: None,
            env: toolchain.env,
        };

        let outcome = self.runtime.execute(&toolchain.command, params).await;
        drop(code);

        let message = match outcome {
            Ok(_) => {
                reservation
                    .commit()
                    .context("failed to commit compiled_code output")?;
                return Ok(JobResult::compile(job.id.clone(), JobStatus::OK, None));
            }
            Err(RuntimeError::NonZeroExit { stderr, stdout, .. }) => {
                if stderr.is_empty() { stdout } else { stderr }
            }
            Err(RuntimeError::Timeout) => "compilation timed out".to_string(),
            Err(RuntimeError::OutOfMemory) => "compiler ran out of memory".to_string(),
            Err(e) => {
                reservation.abort();
                return Err(e).context("failed to run compiler");
            }
        };

        reservation.abort();
        Ok(JobResult::compile(job.id.clone(), JobStatus::CE, Some(message)))
    }

    fn cpp(&self) -> Toolchain {
        Toolchain {
            image: self.images.cpp.clone(),
            source_file: "main.cpp",
            command: vec![
                "g++".to_string(),
                "-O2".to_string(),
                "-std=c++17".to_string(),
                "-o".to_string(),
                sandbox_path(BINARY),
                sandbox_path("main.cpp"),
            ],
            env: Vec::new(),
        }
    }

    fn go(&self) -> Toolchain {
        Toolchain {
            image: self.images.go.clone(),
            source_file: "main.go",
            command: vec![
                "go".to_string(),
                "build".to_string(),
                "-o".to_string(),
                sandbox_path(BINARY),
                sandbox_path("main.go"),
            ],
            env: vec![
                ("GOCACHE".to_string(), sandbox_path(".gocache")),
                ("CGO_ENABLED".to_string(), "0".to_string()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::{FakeRuntime, Fixture};
    use exesh_core::domain::{JobId, Output};

    fn compile_job(fixture: &Fixture, id: &str, go: bool) -> Job {
        let job = CompileJob {
            id: JobId::new(id),
            success_status: JobStatus::OK,
            code: fixture.inline(if go { "package main" } else { "int main() {}" }),
            compiled_code: Output::new("a.out"),
        };
        if go { Job::CompileGo(job) } else { Job::CompileCpp(job) }
    }

    fn executor(fixture: &Fixture, runtime: Arc<FakeRuntime>) -> CompileExecutor {
        CompileExecutor::new(
            runtime,
            Arc::clone(&fixture.inputs),
            Arc::clone(&fixture.outputs),
            Images::default(),
        )
    }

    #[tokio::test]
    async fn test_successful_compile_commits_artifact() {
        let fixture = Fixture::new();
        let runtime = FakeRuntime::stdout("");
        let executor = executor(&fixture, Arc::clone(&runtime));

        let result = executor.execute(&compile_job(&fixture, "ab12", false)).await.unwrap();
        assert_eq!(result.status(), JobStatus::OK);

        let artifact = exesh_core::domain::Input::Artifact {
            job_id: JobId::new("ab12"),
            file: "a.out".to_string(),
        };
        assert_eq!(fixture.inputs.read(&artifact).await.unwrap(), "artifact");

        let calls = runtime.calls.lock().unwrap();
        let (command, params) = &calls[0];
        assert_eq!(command[0], "g++");
        assert!(command.contains(&"-std=c++17".to_string()));
        assert_eq!(params.in_files[0].inside, "/tmp/main.cpp");
        assert_eq!(params.out_files[0].inside, "/tmp/program");
    }

    #[tokio::test]
    async fn test_compile_error_reports_stderr_and_aborts() {
        let fixture = Fixture::new();
        let runtime = FakeRuntime::failing(|| RuntimeError::NonZeroExit {
            code: 1,
            stdout: String::new(),
            stderr: "main.cpp:1: error".to_string(),
        });
        let executor = executor(&fixture, runtime);

        let result = executor.execute(&compile_job(&fixture, "ab12", false)).await.unwrap();
        assert_eq!(result.status(), JobStatus::CE);
        match result {
            JobResult::Compile(compile) => {
                assert_eq!(compile.compilation_error.as_deref(), Some("main.cpp:1: error"));
            }
            other => panic!("unexpected result {:?}", other),
        }

        // nothing was published, so the job may be retried
        assert!(fixture
            .outputs
            .reserve(&JobId::new("ab12"), &Output::new("a.out"))
            .is_ok());
    }

    #[tokio::test]
    async fn test_compile_timeout_is_ce() {
        let fixture = Fixture::new();
        let executor = executor(&fixture, FakeRuntime::failing(|| RuntimeError::Timeout));

        let result = executor.execute(&compile_job(&fixture, "ab12", true)).await.unwrap();
        assert_eq!(result.status(), JobStatus::CE);
    }

    #[tokio::test]
    async fn test_existing_artifact_short_circuits() {
        let fixture = Fixture::new();
        let reservation = fixture
            .outputs
            .reserve(&JobId::new("ab12"), &Output::new("a.out"))
            .unwrap();
        std::fs::write(reservation.path(), "bin").unwrap();
        reservation.commit().unwrap();

        let runtime = FakeRuntime::stdout("");
        let executor = executor(&fixture, Arc::clone(&runtime));
        let result = executor.execute(&compile_job(&fixture, "ab12", false)).await.unwrap();

        assert_eq!(result.status(), JobStatus::OK);
        assert_eq!(runtime.call_count(), 0);
    }

    #[tokio::test]
    async fn test_go_uses_go_toolchain() {
        let fixture = Fixture::new();
        let runtime = FakeRuntime::stdout("");
        let executor = executor(&fixture, Arc::clone(&runtime));

        executor.execute(&compile_job(&fixture, "cd34", true)).await.unwrap();

        let calls = runtime.calls.lock().unwrap();
        let (command, params) = &calls[0];
        assert_eq!(&command[..2], ["go", "build"]);
        assert_eq!(params.image, Images::default().go);
    }
}
