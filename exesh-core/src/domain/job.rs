//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::id::JobId;
use crate::domain::input::{Input, Output};

/// Outcome status of a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    OK,
    /// Compilation error
    CE,
    /// Runtime error
    RE,
    /// Time limit exceeded
    TL,
    /// Memory limit exceeded
    ML,
    /// Wrong answer
    WA,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::OK => "OK",
            JobStatus::CE => "CE",
            JobStatus::RE => "RE",
            JobStatus::TL => "TL",
            JobStatus::ML => "ML",
            JobStatus::WA => "WA",
        };
        f.write_str(s)
    }
}

/// Job kind, the tag of [`Job`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    CompileCpp,
    CompileGo,
    RunCpp,
    RunPy,
    RunGo,
    CheckCpp,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::CompileCpp => "compile_cpp",
            JobKind::CompileGo => "compile_go",
            JobKind::RunCpp => "run_cpp",
            JobKind::RunPy => "run_py",
            JobKind::RunGo => "run_go",
            JobKind::CheckCpp => "check_cpp",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiles `code` into the `compiled_code` artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileJob {
    pub id: JobId,
    pub success_status: JobStatus,
    pub code: Input,
    pub compiled_code: Output,
}

/// Runs `program` with `run_input` on stdin, storing stdout as `run_output`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunJob {
    pub id: JobId,
    pub success_status: JobStatus,
    /// Compiled binary, or the script itself for interpreted languages
    pub program: Input,
    pub run_input: Input,
    pub run_output: Output,
    /// Milliseconds of CPU time
    pub time_limit: u64,
    /// Mebibytes
    pub memory_limit: u64,
    pub show_output: bool,
}

/// Compares a suspect output against the correct one with a checker binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckJob {
    pub id: JobId,
    pub success_status: JobStatus,
    pub compiled_checker: Input,
    pub correct_output: Input,
    pub suspect_output: Input,
}

/// An atomic unit of sandboxed work
///
/// Immutable once built; the id is derived from everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    CompileCpp(CompileJob),
    CompileGo(CompileJob),
    RunCpp(RunJob),
    RunPy(RunJob),
    RunGo(RunJob),
    CheckCpp(CheckJob),
}

impl Job {
    pub fn id(&self) -> &JobId {
        match self {
            Job::CompileCpp(job) | Job::CompileGo(job) => &job.id,
            Job::RunCpp(job) | Job::RunPy(job) | Job::RunGo(job) => &job.id,
            Job::CheckCpp(job) => &job.id,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Job::CompileCpp(_) => JobKind::CompileCpp,
            Job::CompileGo(_) => JobKind::CompileGo,
            Job::RunCpp(_) => JobKind::RunCpp,
            Job::RunPy(_) => JobKind::RunPy,
            Job::RunGo(_) => JobKind::RunGo,
            Job::CheckCpp(_) => JobKind::CheckCpp,
        }
    }

    /// Status this job must finish with for the execution to go on
    pub fn success_status(&self) -> JobStatus {
        match self {
            Job::CompileCpp(job) | Job::CompileGo(job) => job.success_status,
            Job::RunCpp(job) | Job::RunPy(job) | Job::RunGo(job) => job.success_status,
            Job::CheckCpp(job) => job.success_status,
        }
    }

    pub fn inputs(&self) -> Vec<&Input> {
        match self {
            Job::CompileCpp(job) | Job::CompileGo(job) => vec![&job.code],
            Job::RunCpp(job) | Job::RunPy(job) | Job::RunGo(job) => {
                vec![&job.program, &job.run_input]
            }
            Job::CheckCpp(job) => vec![
                &job.compiled_checker,
                &job.correct_output,
                &job.suspect_output,
            ],
        }
    }

    pub fn output(&self) -> Option<&Output> {
        match self {
            Job::CompileCpp(job) | Job::CompileGo(job) => Some(&job.compiled_code),
            Job::RunCpp(job) | Job::RunPy(job) | Job::RunGo(job) => Some(&job.run_output),
            Job::CheckCpp(_) => None,
        }
    }

    /// Jobs whose artifacts this job consumes, in input order without repeats
    pub fn dependencies(&self) -> Vec<&JobId> {
        let mut deps: Vec<&JobId> = Vec::new();
        for input in self.inputs() {
            if let Some(dep) = input.dependency() {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }
        deps
    }
}
