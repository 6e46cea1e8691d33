//! Identifiers
//!
//! Jobs, sources and buckets are content addressed: their identifiers are
//! lowercase hex SHA-256 digests. Executions are identified by a UUID.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

macro_rules! digest_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an already computed hex digest
            pub fn new(hex: impl Into<String>) -> Self {
                Self(hex.into())
            }

            /// Builds the identifier from a finished hasher
            pub fn from_hasher(hasher: IdHasher) -> Self {
                Self(hasher.finish())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

digest_id!(
    /// Identity of a job, derived from its kind, inputs and attributes
    JobId
);

digest_id!(
    /// Identity of a piece of source material
    SourceId
);

digest_id!(
    /// Name of a bucket in the artifact store
    BucketId
);

impl From<JobId> for BucketId {
    /// A job writes its artifact into the bucket named after the job
    fn from(id: JobId) -> Self {
        BucketId(id.0)
    }
}

impl From<&JobId> for BucketId {
    fn from(id: &JobId) -> Self {
        BucketId(id.0.clone())
    }
}

impl SourceId {
    /// Source under which the artifact `file` of job `job_id` is shipped to workers
    pub fn for_artifact(job_id: &JobId, file: &str) -> Self {
        let mut hasher = IdHasher::new("artifact");
        hasher.field(job_id.as_str());
        hasher.field(file);
        Self::from_hasher(hasher)
    }

    /// Source for inline content
    pub fn for_inline(content: &str) -> Self {
        let mut hasher = IdHasher::new("inline");
        hasher.field(content);
        Self::from_hasher(hasher)
    }

    /// Source for a file inside a filestorage bucket
    pub fn for_bucket_file(bucket_id: &BucketId, file: &str) -> Self {
        let mut hasher = IdHasher::new("filestorage_bucket_file");
        hasher.field(bucket_id.as_str());
        hasher.field(file);
        Self::from_hasher(hasher)
    }
}

/// Incremental SHA-256 over length-prefixed fields
///
/// Length prefixes keep `("ab", "c")` and `("a", "bc")` apart.
pub struct IdHasher {
    inner: Sha256,
}

impl IdHasher {
    pub fn new(domain: &str) -> Self {
        let mut hasher = Self {
            inner: Sha256::new(),
        };
        hasher.field(domain);
        hasher
    }

    pub fn field(&mut self, value: impl AsRef<[u8]>) -> &mut Self {
        let bytes = value.as_ref();
        self.inner.update((bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
        self
    }

    pub fn finish(self) -> String {
        self.inner
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }
}

/// Execution identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for ExecutionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_ids_are_deterministic() {
        assert_eq!(
            SourceId::for_inline("int main() {}"),
            SourceId::for_inline("int main() {}")
        );
        assert_ne!(
            SourceId::for_inline("int main() {}"),
            SourceId::for_inline("int main() { return 0; }")
        );
    }

    #[test]
    fn test_fields_are_length_prefixed() {
        let bucket_a = BucketId::new("ab");
        let bucket_b = BucketId::new("a");
        assert_ne!(
            SourceId::for_bucket_file(&bucket_a, "c"),
            SourceId::for_bucket_file(&bucket_b, "bc")
        );
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        let id = SourceId::for_inline("");
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_job_bucket_shares_the_digest() {
        let job = JobId::new("0a1b");
        let bucket = BucketId::from(&job);
        assert_eq!(bucket.as_str(), "0a1b");
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let job = JobId::new("abc");
        assert_eq!(serde_json::to_string(&job).unwrap(), "\"abc\"");
    }
}
