//! Output provider
//!
//! Every job writes its output into the bucket named after the job.

use exesh_core::domain::{BucketId, JobId, Output};
use std::sync::Arc;
use std::time::Duration;

use super::{ArtifactWriter, FilestorageAdapter, Result};
use crate::filestorage::Reservation;

pub struct OutputProvider {
    adapter: Arc<FilestorageAdapter>,
    ttl: Duration,
}

impl OutputProvider {
    pub fn new(adapter: Arc<FilestorageAdapter>, ttl: Duration) -> Self {
        Self { adapter, ttl }
    }

    /// Reserves the output file of `job_id` to be filled by path
    pub fn reserve(&self, job_id: &JobId, output: &Output) -> Result<Reservation> {
        self.adapter
            .reserve(&BucketId::from(job_id), &output.file, self.ttl)
    }

    /// Reserves the output file of `job_id` and opens it for writing
    pub fn create(&self, job_id: &JobId, output: &Output) -> Result<ArtifactWriter> {
        self.adapter
            .create(&BucketId::from(job_id), &output.file, self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use crate::provider::adapter::tests::temp_adapter;

    #[test]
    fn test_output_lands_in_job_bucket() {
        let adapter = Arc::new(temp_adapter());
        let outputs = OutputProvider::new(Arc::clone(&adapter), Duration::from_secs(60));
        let job_id = JobId::new("ab12");
        let output = Output::new("a.out");

        let reservation = outputs.reserve(&job_id, &output).unwrap();
        assert_eq!(reservation.bucket(), &BucketId::from(&job_id));
        std::fs::write(reservation.path(), "bin").unwrap();
        reservation.commit().unwrap();

        assert!(matches!(
            outputs.create(&job_id, &output),
            Err(ProviderError::AlreadyExists)
        ));
    }
}
