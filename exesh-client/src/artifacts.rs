//! Artifact downloads between workers

use reqwest::Client;
use std::time::Duration;

use crate::error::Result;
use crate::{DEFAULT_TIMEOUT, check_status, http_client};

/// Fetches files served by other workers under `/filestorage`
#[derive(Debug, Clone)]
pub struct ArtifactClient {
    client: Client,
}

impl Default for ArtifactClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactClient {
    pub fn new() -> Self {
        Self::with_client(http_client(DEFAULT_TIMEOUT).unwrap_or_else(|_| Client::new()))
    }

    /// Downloads fail after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(http_client(timeout)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Download `file` of `bucket` from the worker at `endpoint`
    pub async fn download(&self, endpoint: &str, bucket: &str, file: &str) -> Result<Vec<u8>> {
        let url = file_url(endpoint, bucket, file);
        tracing::debug!("Downloading {}", url);

        let response = self.client.get(&url).send().await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn file_url(endpoint: &str, bucket: &str, file: &str) -> String {
    format!(
        "{}/filestorage/{}/{}",
        endpoint.trim_end_matches('/'),
        bucket,
        file
    )
}
