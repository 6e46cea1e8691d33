//! Source material shipped to workers

use serde::{Deserialize, Serialize};

use crate::domain::id::{BucketId, SourceId};

/// Content a worker must be able to read before running a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    Inline {
        id: SourceId,
        content: String,
    },
    FilestorageBucketFile {
        id: SourceId,
        bucket_id: BucketId,
        file: String,
        download_endpoint: String,
    },
}

impl Source {
    pub fn id(&self) -> &SourceId {
        match self {
            Source::Inline { id, .. } | Source::FilestorageBucketFile { id, .. } => id,
        }
    }
}
