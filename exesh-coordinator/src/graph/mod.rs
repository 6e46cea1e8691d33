//! Dependency Graph Engine
//!
//! Turns resolved stages into a DAG of jobs and tracks which jobs are ready
//! to run as results come in. Graphs are derived, never persisted: they are
//! rebuilt from the execution each time it is scheduled.

pub mod jobs;
pub mod stages;

pub use jobs::JobGraph;
pub use stages::StageGraph;

use exesh_core::domain::JobId;
use thiserror::Error;

/// Construction errors; fatal to the execution being built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("dependency cycle through job {0}")]
    Cycle(JobId),

    #[error("job {job} depends on unknown job {dependency}")]
    UnknownDependency { job: JobId, dependency: JobId },

    #[error("conflicting definitions for job {0}")]
    DuplicateJob(JobId),

    #[error("stage {stage} depends on unknown stage {dependency}")]
    UnknownStage { stage: String, dependency: String },

    #[error("stage {0} is defined more than once")]
    DuplicateStage(String),

    #[error("dependency cycle through stage {0}")]
    StageCycle(String),
}
