//! Execution Repository
//!
//! Postgres storage of execution records. Saving an execution also appends
//! its outgoing messages to the outbox in the same transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exesh_core::domain::{Execution, ExecutionId, ExecutionStatus, Message};
use uuid::Uuid;

use super::{ExecutionRepository, PgStore, RepositoryError, Result};

#[async_trait]
impl ExecutionRepository for PgStore {
    async fn create(&self, execution: &Execution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO executions (id, sources, stages, status, created_at, scheduled_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(execution.id.0)
        .bind(serde_json::to_value(&execution.sources)?)
        .bind(serde_json::to_value(&execution.stages)?)
        .bind(execution.status.as_str())
        .bind(execution.created_at)
        .bind(execution.scheduled_at)
        .bind(execution.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: ExecutionId) -> Result<Option<Execution>> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT id, sources, stages, status, created_at, scheduled_at, finished_at
            FROM executions
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Execution::try_from).transpose()
    }

    async fn claim_for_schedule(
        &self,
        retry_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Execution>> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            UPDATE executions
            SET status = 'scheduled', scheduled_at = $2
            WHERE id = (
                SELECT id FROM executions
                WHERE status = 'new'
                   OR (status = 'scheduled' AND scheduled_at < $1)
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, sources, stages, status, created_at, scheduled_at, finished_at
            "#,
        )
        .bind(retry_before)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Execution::try_from).transpose()
    }

    async fn save(&self, execution: &Execution, messages: &[Message]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE executions
            SET status = $1, scheduled_at = $2, finished_at = $3
            WHERE id = $4
            "#,
        )
        .bind(execution.status.as_str())
        .bind(execution.scheduled_at)
        .bind(execution.finished_at)
        .bind(execution.id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(execution.id));
        }

        for message in messages {
            sqlx::query("INSERT INTO outbox (message, created_at) VALUES ($1, $2)")
                .bind(serde_json::to_value(message)?)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Helper Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    sources: serde_json::Value,
    stages: serde_json::Value,
    status: String,
    created_at: DateTime<Utc>,
    scheduled_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = RepositoryError;

    fn try_from(row: ExecutionRow) -> std::result::Result<Self, Self::Error> {
        let status: ExecutionStatus = row.status.parse().map_err(RepositoryError::Corrupt)?;

        Ok(Execution {
            id: ExecutionId(row.id),
            sources: serde_json::from_value(row.sources)?,
            stages: serde_json::from_value(row.stages)?,
            status,
            created_at: row.created_at,
            scheduled_at: row.scheduled_at,
            finished_at: row.finished_at,
        })
    }
}
