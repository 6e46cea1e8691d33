//! Outbox Repository
//!
//! Postgres storage of messages waiting for delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exesh_core::domain::Message;
use std::time::Duration;

use super::{OutboxRepository, PgStore, Result};

/// A stored message with its delivery bookkeeping
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub message: Message,
    pub created_at: DateTime<Utc>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failed_tries: i32,
}

impl OutboxEntry {
    /// Delay after a failure before the entry is retried
    pub fn backoff(&self) -> Duration {
        let exponent = self.failed_tries.clamp(0, 6) as u32;
        Duration::from_millis(100) * 2u32.pow(exponent)
    }

    /// Whether the entry may be sent at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.failed_at {
            None => true,
            Some(failed_at) => {
                let backoff = chrono::Duration::from_std(self.backoff())
                    .unwrap_or_else(|_| chrono::Duration::zero());
                failed_at + backoff <= now
            }
        }
    }
}

#[async_trait]
impl OutboxRepository for PgStore {
    async fn pending(&self, limit: i64) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, message, created_at, failed_at, failed_tries
            FROM outbox
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM outbox WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox
            SET failed_at = $1, failed_tries = failed_tries + 1
            WHERE id = $2
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Helper Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    message: serde_json::Value,
    created_at: DateTime<Utc>,
    failed_at: Option<DateTime<Utc>>,
    failed_tries: i32,
}

impl TryFrom<OutboxRow> for OutboxEntry {
    type Error = super::RepositoryError;

    fn try_from(row: OutboxRow) -> std::result::Result<Self, Self::Error> {
        Ok(OutboxEntry {
            id: row.id,
            message: serde_json::from_value(row.message)?,
            created_at: row.created_at,
            failed_at: row.failed_at,
            failed_tries: row.failed_tries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exesh_core::domain::ExecutionId;

    fn entry(failed_tries: i32, failed_at: Option<DateTime<Utc>>) -> OutboxEntry {
        OutboxEntry {
            id: 1,
            message: Message::ExecutionStarted {
                execution_id: ExecutionId::new(),
            },
            created_at: Utc::now(),
            failed_at,
            failed_tries,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(entry(0, None).backoff(), Duration::from_millis(100));
        assert_eq!(entry(1, None).backoff(), Duration::from_millis(200));
        assert_eq!(entry(3, None).backoff(), Duration::from_millis(800));
        assert_eq!(entry(6, None).backoff(), Duration::from_millis(6400));
        assert_eq!(entry(60, None).backoff(), Duration::from_millis(6400));
    }

    #[test]
    fn test_is_due_after_backoff() {
        let now = Utc::now();
        assert!(entry(0, None).is_due(now));

        let failed = entry(2, Some(now));
        assert!(!failed.is_due(now + chrono::Duration::milliseconds(399)));
        assert!(failed.is_due(now + chrono::Duration::milliseconds(400)));
    }
}
