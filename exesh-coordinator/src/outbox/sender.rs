//! Outbox sender
//!
//! Polls the outbox in id order and publishes each due entry. Delivered
//! entries are deleted; failed ones are retried after an exponential backoff.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::MessagePublisher;
use crate::repository::{OutboxRepository, RepositoryError};

#[derive(Debug, Clone)]
pub struct SenderSettings {
    pub poll_interval: Duration,
    pub batch_size: i64,
}

pub struct OutboxSender {
    outbox: Arc<dyn OutboxRepository>,
    publisher: Arc<dyn MessagePublisher>,
    settings: SenderSettings,
}

impl OutboxSender {
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        publisher: Arc<dyn MessagePublisher>,
        settings: SenderSettings,
    ) -> Self {
        Self {
            outbox,
            publisher,
            settings,
        }
    }

    /// Starts the delivery loop
    pub async fn run(&self) {
        info!(
            "Starting outbox sender (interval: {:?})",
            self.settings.poll_interval
        );

        let mut interval = time::interval(self.settings.poll_interval);

        loop {
            interval.tick().await;

            match self.send_once().await {
                Ok(0) => {}
                Ok(sent) => debug!("Delivered {} message(s)", sent),
                Err(e) => error!("Error during outbox cycle: {}", e),
            }
        }
    }

    /// Delivers one batch of due entries, returning how many succeeded
    pub async fn send_once(&self) -> Result<usize, RepositoryError> {
        let entries = self.outbox.pending(self.settings.batch_size).await?;
        let now = Utc::now();
        let mut sent = 0;

        for entry in entries {
            if !entry.is_due(now) {
                continue;
            }

            match self.publisher.publish(&entry.message).await {
                Ok(()) => {
                    self.outbox.delete(entry.id).await?;
                    sent += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to deliver outbox entry {} (attempt {}): {}",
                        entry.id,
                        entry.failed_tries + 1,
                        e
                    );
                    self.outbox.mark_failed(entry.id, Utc::now()).await?;
                }
            }
        }

        Ok(sent)
    }
}
