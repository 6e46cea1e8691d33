//! Job inputs and outputs

use serde::{Deserialize, Serialize};

use crate::domain::id::{JobId, SourceId};

/// Something a job reads
///
/// Every variant carries what a worker needs to find the content: either the
/// producing job and its output file, or the id of a source shipped alongside
/// the job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Input {
    /// Output of another job
    Artifact { job_id: JobId, file: String },
    /// Content submitted together with the execution
    Inline { source_id: SourceId },
    /// A file kept in a filestorage bucket
    FilestorageBucketFile { source_id: SourceId },
}

impl Input {
    /// The job this input depends on, if any
    pub fn dependency(&self) -> Option<&JobId> {
        match self {
            Input::Artifact { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    /// Source id a worker resolves this input through
    pub fn source_id(&self) -> SourceId {
        match self {
            Input::Artifact { job_id, file } => SourceId::for_artifact(job_id, file),
            Input::Inline { source_id } | Input::FilestorageBucketFile { source_id } => {
                source_id.clone()
            }
        }
    }
}

/// A named artifact slot a job writes into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Output {
    pub file: String,
}

impl Output {
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }

    /// Input a downstream job uses to consume this output of `job_id`
    pub fn into_input(self, job_id: JobId) -> Input {
        Input::Artifact {
            job_id,
            file: self.file,
        }
    }
}
