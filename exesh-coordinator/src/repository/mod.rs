//! Repository Module
//!
//! Data access layer for the coordinator. Execution records and the outbox
//! live behind two traits so the scheduler can run against Postgres in
//! production and an in-memory store in tests or without a database.

pub mod execution;
pub mod memory;
pub mod outbox;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exesh_core::domain::{Execution, ExecutionId, Message};
use sqlx::PgPool;
use thiserror::Error;

pub use memory::InMemoryStore;
pub use outbox::OutboxEntry;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed stored data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed stored data: {0}")]
    Corrupt(String),

    #[error("execution {0} not found")]
    NotFound(ExecutionId),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Postgres implementation of both repositories
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Minimal transactional contract over execution records
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn create(&self, execution: &Execution) -> Result<()>;

    async fn get(&self, id: ExecutionId) -> Result<Option<Execution>>;

    /// Claims one execution to schedule and marks it scheduled at `now`
    ///
    /// Candidates are new executions and scheduled ones whose `scheduled_at`
    /// is older than `retry_before`, oldest first.
    async fn claim_for_schedule(
        &self,
        retry_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Execution>>;

    /// Stores the record and appends `messages` to the outbox atomically
    async fn save(&self, execution: &Execution, messages: &[Message]) -> Result<()>;
}

/// Messages waiting to be delivered
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Oldest entries first
    async fn pending(&self, limit: i64) -> Result<Vec<OutboxEntry>>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn mark_failed(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}
