//! Filestorage adapter
//!
//! Two-phase reservation on top of [`FileStorage`] plus download-on-miss.

use exesh_client::ArtifactClient;
use exesh_core::domain::BucketId;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{ProviderError, Result};
use crate::filestorage::{FileLock, FileStorage, Reservation, StorageError};

/// Attempts at locating a file before giving up
const LOCATE_ATTEMPTS: u32 = 50;

pub struct FilestorageAdapter {
    storage: Arc<FileStorage>,
    downloads: ArtifactClient,
    /// Trash time given to downloaded buckets
    ttl: Duration,
    /// Pause between attempts while someone else produces a file
    wait: Duration,
}

impl FilestorageAdapter {
    pub fn new(storage: Arc<FileStorage>, downloads: ArtifactClient, ttl: Duration) -> Self {
        Self {
            storage,
            downloads,
            ttl,
            wait: Duration::from_millis(100),
        }
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Reserves `file` in `bucket`, creating the bucket when needed
    ///
    /// Returns `AlreadyExists` when the file is already there.
    pub fn reserve(&self, bucket: &BucketId, file: &str, ttl: Duration) -> Result<Reservation> {
        match self.storage.reserve_bucket(bucket, file, ttl) {
            Ok(reservation) => Ok(reservation),
            Err(StorageError::BucketAlreadyExists(_)) => {
                match self.storage.reserve_file(bucket, file) {
                    Ok(reservation) => Ok(reservation),
                    Err(StorageError::FileAlreadyExists { .. }) => Err(ProviderError::AlreadyExists),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reserves `file` and opens it for writing
    pub fn create(&self, bucket: &BucketId, file: &str, ttl: Duration) -> Result<ArtifactWriter> {
        let reservation = self.reserve(bucket, file, ttl)?;
        let handle = File::create(reservation.path())?;
        Ok(ArtifactWriter {
            file: handle,
            reservation,
        })
    }

    /// Read lock on `file`, downloading it from `endpoint` when missing
    ///
    /// Waits while another task holds the reservation for the same file.
    pub async fn locate(
        &self,
        bucket: &BucketId,
        file: &str,
        endpoint: Option<&str>,
    ) -> Result<FileLock> {
        for _ in 0..LOCATE_ATTEMPTS {
            match self.storage.get_file(bucket, file) {
                Ok(lock) => return Ok(lock),
                Err(StorageError::Reserved { .. }) => {
                    tokio::time::sleep(self.wait).await;
                    continue;
                }
                Err(e) if e.is_missing() => {}
                Err(e) => return Err(e.into()),
            }

            let Some(endpoint) = endpoint else {
                return Err(ProviderError::NotFound(format!("{}/{}", bucket, file)));
            };

            match self.reserve(bucket, file, self.ttl) {
                Ok(reservation) => self.download(reservation, endpoint).await?,
                // produced concurrently, look again
                Err(ProviderError::AlreadyExists) => {}
                Err(ProviderError::Storage(StorageError::Reserved { .. })) => {
                    tokio::time::sleep(self.wait).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(ProviderError::Busy(format!("{}/{}", bucket, file)))
    }

    /// Whole content of `file` as text
    pub async fn read(&self, bucket: &BucketId, file: &str, endpoint: Option<&str>) -> Result<String> {
        let lock = self.locate(bucket, file, endpoint).await?;
        Ok(tokio::fs::read_to_string(lock.path()).await?)
    }

    async fn download(&self, reservation: Reservation, endpoint: &str) -> Result<()> {
        debug!(
            "Downloading {}/{} from {}",
            reservation.bucket(),
            reservation.file(),
            endpoint
        );

        let content = match self
            .downloads
            .download(endpoint, reservation.bucket().as_str(), reservation.file())
            .await
        {
            Ok(content) => content,
            Err(e) => {
                reservation.abort();
                return Err(e.into());
            }
        };

        if let Err(e) = tokio::fs::write(reservation.path(), content).await {
            reservation.abort();
            return Err(e.into());
        }

        reservation.commit()?;
        Ok(())
    }
}

/// Writer for a reserved artifact
///
/// Nothing is visible until [`ArtifactWriter::commit`]; dropping the writer
/// aborts the reservation.
pub struct ArtifactWriter {
    file: File,
    reservation: Reservation,
}

impl ArtifactWriter {
    pub fn commit(mut self) -> Result<()> {
        if let Err(e) = self.file.flush().and_then(|()| self.file.sync_all()) {
            self.reservation.abort();
            return Err(e.into());
        }
        drop(self.file);
        self.reservation.commit()?;
        Ok(())
    }

    pub fn abort(self) {
        drop(self.file);
        self.reservation.abort();
    }
}

impl Write for ArtifactWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}
