//! Content providers
//!
//! Executors never touch the file storage directly: sources are
//! materialized by [`SourceProvider`], inputs resolved by [`InputProvider`]
//! and job outputs produced through [`OutputProvider`].

pub mod adapter;
pub mod input;
pub mod output;
pub mod source;

pub use adapter::{ArtifactWriter, FilestorageAdapter};
pub use input::InputProvider;
pub use output::OutputProvider;
pub use source::SourceProvider;

use exesh_core::domain::SourceId;
use thiserror::Error;

use crate::filestorage::StorageError;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Someone already produced this content; producers treat it as success
    #[error("artifact already exists")]
    AlreadyExists,

    #[error("{0} not found")]
    NotFound(String),

    #[error("source {0} is unknown to this worker")]
    UnknownSource(SourceId),

    #[error("timed out waiting for {0}")]
    Busy(String),

    #[error("download failed: {0}")]
    Download(#[from] exesh_client::ClientError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;
