//! Storage errors

use exesh_core::domain::BucketId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket {0} already exists")]
    BucketAlreadyExists(BucketId),

    #[error("file {file} already exists in bucket {bucket}")]
    FileAlreadyExists { bucket: BucketId, file: String },

    #[error("file {file} of bucket {bucket} is being produced")]
    Reserved { bucket: BucketId, file: String },

    #[error("bucket {0} not found")]
    BucketNotFound(BucketId),

    #[error("file {file} not found in bucket {bucket}")]
    FileNotFound { bucket: BucketId, file: String },

    #[error("invalid name {0:?}")]
    InvalidName(String),

    #[error("corrupt bucket metadata: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// The requested content does not exist and nobody is producing it
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            StorageError::BucketNotFound(_) | StorageError::FileNotFound { .. }
        )
    }
}
