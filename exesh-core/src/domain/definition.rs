//! Submission format
//!
//! Executions are submitted as named sources plus stages of named jobs.
//! Names only live inside one submission; the coordinator resolves them into
//! content derived ids.

use serde::{Deserialize, Serialize};

use crate::domain::id::BucketId;
use crate::domain::job::{JobKind, JobStatus};

/// A named piece of source material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceDefinition {
    Inline {
        name: String,
        content: String,
    },
    /// A whole bucket; inputs pick files from it
    FilestorageBucket {
        name: String,
        bucket_id: BucketId,
        download_endpoint: String,
    },
    FilestorageBucketFile {
        name: String,
        bucket_id: BucketId,
        file: String,
        download_endpoint: String,
    },
}

impl SourceDefinition {
    pub fn name(&self) -> &str {
        match self {
            SourceDefinition::Inline { name, .. }
            | SourceDefinition::FilestorageBucket { name, .. }
            | SourceDefinition::FilestorageBucketFile { name, .. } => name,
        }
    }
}

/// Reference to something a job reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputDefinition {
    /// The output of an earlier job, by job name
    Artifact { job: String },
    Inline { source: String },
    FilestorageBucket { source: String, file: String },
    FilestorageBucketFile { source: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileJobDefinition {
    pub name: String,
    #[serde(default)]
    pub success_status: JobStatus,
    pub code: InputDefinition,
    pub compiled_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunJobDefinition {
    pub name: String,
    #[serde(default)]
    pub success_status: JobStatus,
    pub program: InputDefinition,
    pub run_input: InputDefinition,
    pub run_output: String,
    pub time_limit: u64,
    pub memory_limit: u64,
    #[serde(default)]
    pub show_output: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckJobDefinition {
    pub name: String,
    #[serde(default)]
    pub success_status: JobStatus,
    pub compiled_checker: InputDefinition,
    pub correct_output: InputDefinition,
    pub suspect_output: InputDefinition,
}

/// A named job as submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobDefinition {
    CompileCpp(CompileJobDefinition),
    CompileGo(CompileJobDefinition),
    RunCpp(RunJobDefinition),
    RunPy(RunJobDefinition),
    RunGo(RunJobDefinition),
    CheckCpp(CheckJobDefinition),
}

impl JobDefinition {
    pub fn name(&self) -> &str {
        match self {
            JobDefinition::CompileCpp(def) | JobDefinition::CompileGo(def) => &def.name,
            JobDefinition::RunCpp(def) | JobDefinition::RunPy(def) | JobDefinition::RunGo(def) => {
                &def.name
            }
            JobDefinition::CheckCpp(def) => &def.name,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobDefinition::CompileCpp(_) => JobKind::CompileCpp,
            JobDefinition::CompileGo(_) => JobKind::CompileGo,
            JobDefinition::RunCpp(_) => JobKind::RunCpp,
            JobDefinition::RunPy(_) => JobKind::RunPy,
            JobDefinition::RunGo(_) => JobKind::RunGo,
            JobDefinition::CheckCpp(_) => JobKind::CheckCpp,
        }
    }
}

/// A named group of jobs gated by other stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    #[serde(default)]
    pub deps: Vec<String>,
    pub jobs: Vec<JobDefinition>,
}
