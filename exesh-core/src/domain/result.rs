//! Job results reported by workers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::id::JobId;
use crate::domain::job::{Job, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub done_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compilation_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub done_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub done_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one job
///
/// `error` means the worker could not execute the job at all; it takes
/// precedence over `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobResult {
    Compile(CompileResult),
    Run(RunResult),
    Check(CheckResult),
}

impl JobResult {
    pub fn compile(job_id: JobId, status: JobStatus, compilation_error: Option<String>) -> Self {
        JobResult::Compile(CompileResult {
            job_id,
            status,
            done_at: Utc::now(),
            error: None,
            compilation_error,
        })
    }

    pub fn run(job_id: JobId, status: JobStatus, output: Option<String>) -> Self {
        JobResult::Run(RunResult {
            job_id,
            status,
            done_at: Utc::now(),
            error: None,
            output,
        })
    }

    pub fn check(job_id: JobId, status: JobStatus) -> Self {
        JobResult::Check(CheckResult {
            job_id,
            status,
            done_at: Utc::now(),
            error: None,
        })
    }

    /// Result for a job the worker failed to execute
    pub fn failed(job: &Job, error: impl Into<String>) -> Self {
        let job_id = job.id().clone();
        let done_at = Utc::now();
        let error = Some(error.into());
        match job {
            Job::CompileCpp(_) | Job::CompileGo(_) => JobResult::Compile(CompileResult {
                job_id,
                status: JobStatus::CE,
                done_at,
                error,
                compilation_error: None,
            }),
            Job::RunCpp(_) | Job::RunPy(_) | Job::RunGo(_) => JobResult::Run(RunResult {
                job_id,
                status: JobStatus::RE,
                done_at,
                error,
                output: None,
            }),
            Job::CheckCpp(_) => JobResult::Check(CheckResult {
                job_id,
                status: JobStatus::RE,
                done_at,
                error,
            }),
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            JobResult::Compile(r) => &r.job_id,
            JobResult::Run(r) => &r.job_id,
            JobResult::Check(r) => &r.job_id,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobResult::Compile(r) => r.status,
            JobResult::Run(r) => r.status,
            JobResult::Check(r) => r.status,
        }
    }

    pub fn done_at(&self) -> DateTime<Utc> {
        match self {
            JobResult::Compile(r) => r.done_at,
            JobResult::Run(r) => r.done_at,
            JobResult::Check(r) => r.done_at,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobResult::Compile(r) => r.error.as_deref(),
            JobResult::Run(r) => r.error.as_deref(),
            JobResult::Check(r) => r.error.as_deref(),
        }
    }

    /// True when the job ran and produced its artifact
    pub fn is_ok(&self) -> bool {
        self.error().is_none() && self.status() == JobStatus::OK
    }
}
