//! Input provider
//!
//! Resolves a job input to a local file, downloading it when it lives on
//! another worker.

use exesh_core::domain::{BucketId, Input};
use std::sync::Arc;

use super::source::SourceLocation;
use super::{FilestorageAdapter, ProviderError, Result, SourceProvider};
use crate::filestorage::FileLock;

pub struct InputProvider {
    adapter: Arc<FilestorageAdapter>,
    sources: Arc<SourceProvider>,
}

impl InputProvider {
    pub fn new(adapter: Arc<FilestorageAdapter>, sources: Arc<SourceProvider>) -> Self {
        Self { adapter, sources }
    }

    /// Read lock on the file backing `input`
    pub async fn locate(&self, input: &Input) -> Result<FileLock> {
        let location = self.resolve(input)?;
        self.adapter
            .locate(&location.bucket, &location.file, location.endpoint.as_deref())
            .await
    }

    pub async fn read(&self, input: &Input) -> Result<String> {
        let location = self.resolve(input)?;
        self.adapter
            .read(&location.bucket, &location.file, location.endpoint.as_deref())
            .await
    }

    fn resolve(&self, input: &Input) -> Result<SourceLocation> {
        let source_id = input.source_id();
        if let Some(location) = self.sources.location(&source_id) {
            return Ok(location);
        }

        match input {
            // produced here, nothing was shipped
            Input::Artifact { job_id, file } => Ok(SourceLocation {
                bucket: BucketId::from(job_id),
                file: file.clone(),
                endpoint: None,
            }),
            _ => Err(ProviderError::UnknownSource(source_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::adapter::tests::temp_adapter;
    use exesh_core::domain::{JobId, Source, SourceId};
    use std::io::Write;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(60);

    fn providers() -> (Arc<FilestorageAdapter>, Arc<SourceProvider>, InputProvider) {
        let adapter = Arc::new(temp_adapter());
        let sources = Arc::new(SourceProvider::new(Arc::clone(&adapter), TTL));
        let inputs = InputProvider::new(Arc::clone(&adapter), Arc::clone(&sources));
        (adapter, sources, inputs)
    }

    #[tokio::test]
    async fn test_reads_inline_input() {
        let (_, sources, inputs) = providers();
        let id = SourceId::for_inline("hello");
        sources
            .materialize(&Source::Inline {
                id: id.clone(),
                content: "hello".to_string(),
            })
            .unwrap();

        let text = inputs.read(&Input::Inline { source_id: id }).await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_reads_local_artifact_without_source() {
        let (adapter, _, inputs) = providers();
        let job_id = JobId::new("ab12");
        let mut writer = adapter
            .create(&BucketId::from(&job_id), "output.txt", TTL)
            .unwrap();
        writer.write_all(b"42").unwrap();
        writer.commit().unwrap();

        let input = Input::Artifact {
            job_id,
            file: "output.txt".to_string(),
        };
        assert_eq!(inputs.read(&input).await.unwrap(), "42");
    }

    #[tokio::test]
    async fn test_unknown_source_is_an_error() {
        let (_, _, inputs) = providers();
        let input = Input::Inline {
            source_id: SourceId::new("missing"),
        };
        assert!(matches!(
            inputs.locate(&input).await,
            Err(ProviderError::UnknownSource(_))
        ));
    }
}
