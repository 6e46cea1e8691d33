//! Exesh HTTP Client
//!
//! A type-safe HTTP client for the Exesh coordinator API.
//!
//! The CLI uses it to submit and inspect executions, workers use it for
//! heartbeats and to download artifacts from each other.
//!
//! # Example
//!
//! ```no_run
//! use exesh_client::CoordinatorClient;
//! use exesh_core::dto::execution::ExecuteRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CoordinatorClient::new("http://localhost:8080");
//!
//!     let request: ExecuteRequest = serde_json::from_str(r#"{"stages": []}"#)?;
//!     let response = client.execute(&request).await?;
//!
//!     println!("Submitted execution: {}", response.execution_id);
//!     Ok(())
//! }
//! ```

mod artifacts;
pub mod error;
mod executions;
mod workers;

// Re-export commonly used types
pub use artifacts::ArtifactClient;
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Per-request timeout of clients built with `new`
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds an HTTP client whose requests give up after `timeout`
///
/// Connecting is bounded by the same value.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()?)
}

/// HTTP client for the coordinator API
///
/// Methods are organized into logical groups:
/// - Execution submission and status
/// - Worker heartbeats
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    /// Base URL of the coordinator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl CoordinatorClient {
    /// Create a new coordinator client
    ///
    /// # Example
    /// ```
    /// use exesh_client::CoordinatorClient;
    ///
    /// let client = CoordinatorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        // building only fails when the TLS backend cannot start, as in Client::new
        let client = http_client(DEFAULT_TIMEOUT).unwrap_or_else(|_| Client::new());
        Self::with_client(base_url, client)
    }

    /// Create a client whose requests fail after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(base_url, http_client(timeout)?))
    }

    /// Create a new coordinator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the coordinator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Check the status code and deserialize the JSON body
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Turn a non-success status into an error carrying the response body
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(
            status.as_u16(),
            extract_message(&error_text),
        ));
    }

    Ok(response)
}

/// The message of an `{"error": ...}` body, or the body itself
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
