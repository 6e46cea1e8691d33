//! Source provider
//!
//! Materializes inline sources into local storage and remembers where every
//! other source can be fetched from.

use exesh_core::domain::{BucketId, Source, SourceId};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::{FilestorageAdapter, ProviderError, Result};

/// File name inline content is stored under
const INLINE_FILE: &str = "content";

/// Where a source's content can be found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub bucket: BucketId,
    pub file: String,
    /// Worker to download from when the file is not local
    pub endpoint: Option<String>,
}

struct Known {
    location: SourceLocation,
    /// Matches the trash time of the stored content
    expires_at: Instant,
}

pub struct SourceProvider {
    adapter: Arc<FilestorageAdapter>,
    ttl: Duration,
    locations: Mutex<HashMap<SourceId, Known>>,
}

impl SourceProvider {
    pub fn new(adapter: Arc<FilestorageAdapter>, ttl: Duration) -> Self {
        Self {
            adapter,
            ttl,
            locations: Mutex::new(HashMap::new()),
        }
    }

    /// Makes `source` available to the jobs of this worker
    pub fn materialize(&self, source: &Source) -> Result<()> {
        let location = match source {
            Source::Inline { id, content } => {
                let bucket = BucketId::new(id.as_str());
                match self.adapter.create(&bucket, INLINE_FILE, self.ttl) {
                    Ok(mut writer) => {
                        if let Err(e) = writer.write_all(content.as_bytes()) {
                            writer.abort();
                            return Err(e.into());
                        }
                        writer.commit()?;
                    }
                    Err(ProviderError::AlreadyExists) => {}
                    Err(e) => return Err(e),
                }
                SourceLocation {
                    bucket,
                    file: INLINE_FILE.to_string(),
                    endpoint: None,
                }
            }
            Source::FilestorageBucketFile {
                bucket_id,
                file,
                download_endpoint,
                ..
            } => SourceLocation {
                bucket: bucket_id.clone(),
                file: file.clone(),
                endpoint: Some(download_endpoint.clone()),
            },
        };

        let now = Instant::now();
        let mut locations = self.lock();
        locations.retain(|_, known| known.expires_at > now);
        locations.insert(
            source.id().clone(),
            Known {
                location,
                expires_at: now + self.ttl,
            },
        );
        Ok(())
    }

    /// Where `id` can be read from, unless it was never seen or has expired
    pub fn location(&self, id: &SourceId) -> Option<SourceLocation> {
        self.lock()
            .get(id)
            .filter(|known| known.expires_at > Instant::now())
            .map(|known| known.location.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SourceId, Known>> {
        self.locations.lock().unwrap_or_else(|e| e.into_inner())
    }
}
