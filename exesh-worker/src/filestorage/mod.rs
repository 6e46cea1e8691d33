//! Local file storage
//!
//! Files live in buckets under `<root>/<bucket[0..2]>/<bucket>/<file>`; each
//! bucket carries a `.meta.json` with the time after which it may be removed.
//! New content is written into `<root>/.staging` first and moved into place
//! on commit, so a bucket or file is either complete or absent.
//!
//! Reservations and read locks are tracked in memory: a reserved file cannot
//! be reserved twice, and the garbage collector skips buckets that are being
//! written or read.

pub mod error;

pub use error::StorageError;

use chrono::{DateTime, Utc};
use exesh_core::domain::BucketId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const META_FILE: &str = ".meta.json";
const STAGING_DIR: &str = ".staging";

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Serialize, Deserialize)]
struct BucketMeta {
    trash_time: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    /// Buckets being created
    new_buckets: HashSet<BucketId>,
    /// Files being added to existing buckets
    new_files: HashSet<(BucketId, String)>,
    /// Open read locks per bucket
    readers: HashMap<BucketId, usize>,
}

impl State {
    fn is_busy(&self, bucket: &BucketId) -> bool {
        self.new_buckets.contains(bucket)
            || self.readers.get(bucket).is_some_and(|&count| count > 0)
            || self.new_files.iter().any(|(b, _)| b == bucket)
    }
}

pub struct FileStorage {
    root: PathBuf,
    state: Mutex<State>,
}

impl FileStorage {
    /// Opens the storage at `root`, dropping anything left in staging
    pub fn open(root: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let root = root.into();
        let staging = root.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        info!("File storage opened at {}", root.display());
        Ok(Arc::new(Self {
            root,
            state: Mutex::new(State::default()),
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserves a new bucket together with its first file
    ///
    /// When the bucket already exists its trash time is extended to at least
    /// `now + ttl` and `BucketAlreadyExists` is returned.
    pub fn reserve_bucket(
        self: &Arc<Self>,
        bucket: &BucketId,
        file: &str,
        ttl: Duration,
    ) -> Result<Reservation> {
        validate_name(bucket.as_str())?;
        validate_name(file)?;

        let mut state = self.lock();
        if state.new_buckets.contains(bucket) {
            return Err(StorageError::Reserved {
                bucket: bucket.clone(),
                file: file.to_string(),
            });
        }

        let bucket_dir = self.bucket_dir(bucket);
        if bucket_dir.exists() {
            extend_trash_time(&bucket_dir, ttl)?;
            return Err(StorageError::BucketAlreadyExists(bucket.clone()));
        }

        let staging = self.create_staging()?;
        state.new_buckets.insert(bucket.clone());
        debug!("Reserved bucket {} with file {}", bucket, file);

        Ok(Reservation {
            storage: Arc::clone(self),
            kind: ReservationKind::Bucket { ttl },
            bucket: bucket.clone(),
            file: file.to_string(),
            staging,
            finished: false,
        })
    }

    /// Reserves a new file inside an existing bucket
    pub fn reserve_file(self: &Arc<Self>, bucket: &BucketId, file: &str) -> Result<Reservation> {
        validate_name(bucket.as_str())?;
        validate_name(file)?;

        let mut state = self.lock();
        let key = (bucket.clone(), file.to_string());
        if state.new_buckets.contains(bucket) || state.new_files.contains(&key) {
            return Err(StorageError::Reserved {
                bucket: bucket.clone(),
                file: file.to_string(),
            });
        }

        let bucket_dir = self.bucket_dir(bucket);
        if !bucket_dir.exists() {
            return Err(StorageError::BucketNotFound(bucket.clone()));
        }
        if bucket_dir.join(file).exists() {
            return Err(StorageError::FileAlreadyExists {
                bucket: bucket.clone(),
                file: file.to_string(),
            });
        }

        let staging = self.create_staging()?;
        state.new_files.insert(key);
        debug!("Reserved file {} in bucket {}", file, bucket);

        Ok(Reservation {
            storage: Arc::clone(self),
            kind: ReservationKind::File,
            bucket: bucket.clone(),
            file: file.to_string(),
            staging,
            finished: false,
        })
    }

    /// Read lock on a committed file; keeps the bucket away from GC
    pub fn get_file(self: &Arc<Self>, bucket: &BucketId, file: &str) -> Result<FileLock> {
        validate_name(bucket.as_str())?;
        validate_name(file)?;

        let mut state = self.lock();
        let path = self.bucket_dir(bucket).join(file);
        if !path.exists() {
            let key = (bucket.clone(), file.to_string());
            if state.new_buckets.contains(bucket) || state.new_files.contains(&key) {
                return Err(StorageError::Reserved {
                    bucket: bucket.clone(),
                    file: file.to_string(),
                });
            }
            if !self.bucket_dir(bucket).exists() {
                return Err(StorageError::BucketNotFound(bucket.clone()));
            }
            return Err(StorageError::FileNotFound {
                bucket: bucket.clone(),
                file: file.to_string(),
            });
        }

        *state.readers.entry(bucket.clone()).or_insert(0) += 1;
        Ok(FileLock {
            storage: Arc::clone(self),
            bucket: bucket.clone(),
            path,
        })
    }

    /// Removes expired buckets nobody is writing or reading
    pub fn collect_garbage(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;

        for prefix in fs::read_dir(&self.root)? {
            let prefix = prefix?;
            if prefix.file_name() == STAGING_DIR || !prefix.file_type()?.is_dir() {
                continue;
            }

            for entry in fs::read_dir(prefix.path())? {
                let entry = entry?;
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let bucket_dir = entry.path();

                let expired = match read_meta(&bucket_dir) {
                    Ok(meta) => meta.trash_time <= now,
                    Err(e) => {
                        warn!("Unreadable metadata in {}: {}", bucket_dir.display(), e);
                        true
                    }
                };
                if !expired {
                    continue;
                }

                let state = self.lock();
                if state.is_busy(&BucketId::new(name.as_str())) {
                    continue;
                }
                if let Err(e) = fs::remove_dir_all(&bucket_dir) {
                    warn!("Failed to remove bucket {}: {}", bucket_dir.display(), e);
                    continue;
                }
                drop(state);

                debug!("Removed expired bucket {}", name);
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Runs garbage collection every `interval`
    pub async fn run_gc(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.collect_garbage() {
                Ok(0) => {}
                Ok(removed) => info!("Removed {} expired bucket(s)", removed),
                Err(e) => error!("Garbage collection failed: {}", e),
            }
        }
    }

    fn bucket_dir(&self, bucket: &BucketId) -> PathBuf {
        let id = bucket.as_str();
        let prefix = id.get(..2).unwrap_or(id);
        self.root.join(prefix).join(id)
    }

    fn create_staging(&self) -> Result<PathBuf> {
        let staging = self
            .root
            .join(STAGING_DIR)
            .join(Uuid::new_v4().to_string());
        fs::create_dir_all(&staging)?;
        Ok(staging)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit(&self, reservation: &Reservation) -> Result<()> {
        let bucket_dir = self.bucket_dir(&reservation.bucket);
        let mut state = self.lock();

        let result = match reservation.kind {
            ReservationKind::Bucket { ttl } => {
                state.new_buckets.remove(&reservation.bucket);
                commit_bucket(&reservation.staging, &bucket_dir, ttl)
            }
            ReservationKind::File => {
                state
                    .new_files
                    .remove(&(reservation.bucket.clone(), reservation.file.clone()));
                commit_file(&reservation.staging, &bucket_dir, &reservation.file)
            }
        };
        drop(state);

        let _ = fs::remove_dir_all(&reservation.staging);
        result
    }

    fn abort(&self, reservation: &Reservation) {
        let mut state = self.lock();
        match reservation.kind {
            ReservationKind::Bucket { .. } => {
                state.new_buckets.remove(&reservation.bucket);
            }
            ReservationKind::File => {
                state
                    .new_files
                    .remove(&(reservation.bucket.clone(), reservation.file.clone()));
            }
        }
        drop(state);

        let _ = fs::remove_dir_all(&reservation.staging);
    }

    fn unlock(&self, bucket: &BucketId) {
        let mut state = self.lock();
        if let Some(count) = state.readers.get_mut(bucket) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.readers.remove(bucket);
            }
        }
    }
}

fn commit_bucket(staging: &Path, bucket_dir: &Path, ttl: Duration) -> Result<()> {
    write_meta(staging, trash_time_after(ttl))?;
    if let Some(parent) = bucket_dir.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(staging, bucket_dir)?;
    Ok(())
}

fn commit_file(staging: &Path, bucket_dir: &Path, file: &str) -> Result<()> {
    if !bucket_dir.exists() {
        return Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("bucket {} disappeared", bucket_dir.display()),
        )));
    }
    fs::rename(staging.join(file), bucket_dir.join(file))?;
    Ok(())
}

fn trash_time_after(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365))
}

fn read_meta(bucket_dir: &Path) -> Result<BucketMeta> {
    let content = fs::read_to_string(bucket_dir.join(META_FILE))?;
    Ok(serde_json::from_str(&content)?)
}

fn write_meta(bucket_dir: &Path, trash_time: DateTime<Utc>) -> Result<()> {
    let content = serde_json::to_string(&BucketMeta { trash_time })?;
    fs::write(bucket_dir.join(META_FILE), content)?;
    Ok(())
}

fn extend_trash_time(bucket_dir: &Path, ttl: Duration) -> Result<()> {
    let wanted = trash_time_after(ttl);
    let current = read_meta(bucket_dir).map(|meta| meta.trash_time).ok();
    if current.is_none_or(|current| current < wanted) {
        write_meta(bucket_dir, wanted)?;
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name == META_FILE
        || name == STAGING_DIR
        || name.contains(['/', '\\'])
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

// =============================================================================
// Handles
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum ReservationKind {
    Bucket { ttl: Duration },
    File,
}

/// Exclusive right to produce one file
///
/// Exactly one of [`Reservation::commit`] and [`Reservation::abort`] takes
/// effect; dropping an unfinished reservation aborts it.
pub struct Reservation {
    storage: Arc<FileStorage>,
    kind: ReservationKind,
    bucket: BucketId,
    file: String,
    staging: PathBuf,
    finished: bool,
}

impl Reservation {
    /// Where the content must be written before committing
    pub fn path(&self) -> PathBuf {
        self.staging.join(&self.file)
    }

    pub fn bucket(&self) -> &BucketId {
        &self.bucket
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Moves the written file into place
    ///
    /// A failed commit leaves nothing behind.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let result = self.storage.commit(&self);
        match &result {
            Ok(()) => debug!("Committed {}/{}", self.bucket, self.file),
            Err(e) => warn!("Failed to commit {}/{}: {}", self.bucket, self.file, e),
        }
        result
    }

    pub fn abort(mut self) {
        self.finished = true;
        self.storage.abort(&self);
        debug!("Aborted {}/{}", self.bucket, self.file);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.finished {
            self.storage.abort(self);
        }
    }
}

/// Read access to a committed file
pub struct FileLock {
    storage: Arc<FileStorage>,
    bucket: BucketId,
    path: PathBuf,
}

impl FileLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock")
            .field("bucket", &self.bucket)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.storage.unlock(&self.bucket);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    pub(crate) fn temp_storage() -> Arc<FileStorage> {
        let root = std::env::temp_dir().join(format!("exesh-storage-{}", Uuid::new_v4()));
        FileStorage::open(root).unwrap()
    }

    fn bucket(id: &str) -> BucketId {
        BucketId::new(id)
    }

    #[test]
    fn test_commit_publishes_file() {
        let storage = temp_storage();
        let reservation = storage.reserve_bucket(&bucket("ab12"), "a.out", TTL).unwrap();
        fs::write(reservation.path(), "binary").unwrap();
        reservation.commit().unwrap();

        let lock = storage.get_file(&bucket("ab12"), "a.out").unwrap();
        assert_eq!(fs::read_to_string(lock.path()).unwrap(), "binary");
        assert!(lock.path().starts_with(storage.root().join("ab").join("ab12")));
    }

    #[test]
    fn test_abort_leaves_nothing() {
        let storage = temp_storage();
        let reservation = storage.reserve_bucket(&bucket("ab12"), "a.out", TTL).unwrap();
        fs::write(reservation.path(), "binary").unwrap();
        let staging = reservation.path();
        reservation.abort();

        assert!(!staging.exists());
        assert!(
            storage
                .get_file(&bucket("ab12"), "a.out")
                .unwrap_err()
                .is_missing()
        );
        // the name is free again
        assert!(storage.reserve_bucket(&bucket("ab12"), "a.out", TTL).is_ok());
    }

    #[test]
    fn test_drop_aborts() {
        let storage = temp_storage();
        {
            let reservation = storage.reserve_bucket(&bucket("cd34"), "out", TTL).unwrap();
            fs::write(reservation.path(), "x").unwrap();
        }
        assert!(storage.get_file(&bucket("cd34"), "out").is_err());
        assert!(storage.reserve_bucket(&bucket("cd34"), "out", TTL).is_ok());
    }

    #[test]
    fn test_double_reservation_is_refused() {
        let storage = temp_storage();
        let _held = storage.reserve_bucket(&bucket("ab12"), "a.out", TTL).unwrap();

        assert!(matches!(
            storage.reserve_bucket(&bucket("ab12"), "a.out", TTL),
            Err(StorageError::Reserved { .. })
        ));
        assert!(matches!(
            storage.get_file(&bucket("ab12"), "a.out"),
            Err(StorageError::Reserved { .. })
        ));
    }

    #[test]
    fn test_existing_bucket_falls_back_to_file() {
        let storage = temp_storage();
        let first = storage.reserve_bucket(&bucket("ab12"), "one", TTL).unwrap();
        fs::write(first.path(), "1").unwrap();
        first.commit().unwrap();

        assert!(matches!(
            storage.reserve_bucket(&bucket("ab12"), "two", TTL),
            Err(StorageError::BucketAlreadyExists(_))
        ));

        let second = storage.reserve_file(&bucket("ab12"), "two").unwrap();
        fs::write(second.path(), "2").unwrap();
        second.commit().unwrap();

        assert!(matches!(
            storage.reserve_file(&bucket("ab12"), "two"),
            Err(StorageError::FileAlreadyExists { .. })
        ));
        assert!(storage.get_file(&bucket("ab12"), "two").is_ok());
    }

    #[test]
    fn test_reserve_file_needs_bucket() {
        let storage = temp_storage();
        assert!(matches!(
            storage.reserve_file(&bucket("ef56"), "x"),
            Err(StorageError::BucketNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let storage = temp_storage();
        for name in ["", "..", "a/b", ".meta.json"] {
            assert!(matches!(
                storage.reserve_bucket(&bucket("ab12"), name, TTL),
                Err(StorageError::InvalidName(_))
            ));
        }
        assert!(matches!(
            storage.get_file(&bucket(".."), "x"),
            Err(StorageError::InvalidName(_))
        ));
    }

    #[test]
    fn test_gc_removes_only_expired_unlocked_buckets() {
        let storage = temp_storage();
        for (id, ttl) in [("aa01", Duration::ZERO), ("aa02", Duration::ZERO), ("bb01", TTL)] {
            let reservation = storage.reserve_bucket(&bucket(id), "f", ttl).unwrap();
            fs::write(reservation.path(), id).unwrap();
            reservation.commit().unwrap();
        }

        let lock = storage.get_file(&bucket("aa02"), "f").unwrap();
        assert_eq!(storage.collect_garbage().unwrap(), 1);

        assert!(storage.get_file(&bucket("aa01"), "f").is_err());
        assert!(storage.get_file(&bucket("bb01"), "f").is_ok());

        drop(lock);
        assert_eq!(storage.collect_garbage().unwrap(), 1);
        assert!(storage.get_file(&bucket("aa02"), "f").is_err());
    }

    #[test]
    fn test_gc_continues_past_failed_removal() {
        let storage = temp_storage();
        // expired by unreadable metadata, but not removable as a directory
        let stray = storage.root.join("aa").join("aa00");
        fs::create_dir_all(stray.parent().unwrap()).unwrap();
        fs::write(&stray, "not a bucket").unwrap();

        let reservation = storage.reserve_bucket(&bucket("aa01"), "f", Duration::ZERO).unwrap();
        reservation.commit().unwrap();

        assert_eq!(storage.collect_garbage().unwrap(), 1);
        assert!(storage.get_file(&bucket("aa01"), "f").is_err());
        assert!(stray.exists());
    }

    #[test]
    fn test_reserving_existing_bucket_extends_ttl() {
        let storage = temp_storage();
        let reservation = storage
            .reserve_bucket(&bucket("aa01"), "f", Duration::ZERO)
            .unwrap();
        fs::write(reservation.path(), "x").unwrap();
        reservation.commit().unwrap();

        assert!(storage.reserve_bucket(&bucket("aa01"), "g", TTL).is_err());
        assert_eq!(storage.collect_garbage().unwrap(), 0);
    }

    #[test]
    fn test_open_clears_staging() {
        let root = std::env::temp_dir().join(format!("exesh-storage-{}", Uuid::new_v4()));
        let leftover = root.join(STAGING_DIR).join("stale");
        fs::create_dir_all(&leftover).unwrap();

        FileStorage::open(&root).unwrap();
        assert!(!leftover.exists());
        assert!(root.join(STAGING_DIR).exists());
    }
}
