//! Message publishers

use async_trait::async_trait;
use exesh_core::domain::Message;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("endpoint answered {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Destination of outbox messages
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: &Message) -> Result<(), PublishError>;
}

/// Posts each message as JSON to a fixed URL
pub struct WebhookPublisher {
    url: String,
    client: reqwest::Client,
}

impl WebhookPublisher {
    /// Each delivery attempt gives up after `timeout`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl MessagePublisher for WebhookPublisher {
    async fn publish(&self, message: &Message) -> Result<(), PublishError> {
        let response = self.client.post(&self.url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Writes messages to the log; used when no webhook is configured
pub struct LogPublisher;

#[async_trait]
impl MessagePublisher for LogPublisher {
    async fn publish(&self, message: &Message) -> Result<(), PublishError> {
        match serde_json::to_string(message) {
            Ok(json) => info!(execution_id = %message.execution_id(), "{}", json),
            Err(_) => info!(execution_id = %message.execution_id(), "{:?}", message),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exesh_core::domain::ExecutionId;

    #[tokio::test]
    async fn test_webhook_gives_up_on_silent_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let publisher =
            WebhookPublisher::new(format!("http://{}", address), Duration::from_millis(200))
                .unwrap();
        let message = Message::ExecutionStarted {
            execution_id: ExecutionId::new(),
        };

        let result = tokio::time::timeout(Duration::from_secs(10), publisher.publish(&message))
            .await
            .expect("delivery was not bounded by the timeout");
        assert!(matches!(result, Err(PublishError::RequestFailed(e)) if e.is_timeout()));
    }
}
