//! In-memory store
//!
//! Implements both repositories over a mutex-guarded map. Used when no
//! database is configured and by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exesh_core::domain::{Execution, ExecutionId, ExecutionStatus, Message};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{ExecutionRepository, OutboxEntry, OutboxRepository, RepositoryError, Result};

#[derive(Default)]
struct Inner {
    executions: HashMap<ExecutionId, Execution>,
    outbox: BTreeMap<i64, OutboxEntry>,
    next_outbox_id: i64,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn messages(&self) -> Vec<Message> {
        self.lock()
            .outbox
            .values()
            .map(|entry| entry.message.clone())
            .collect()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryStore {
    async fn create(&self, execution: &Execution) -> Result<()> {
        self.lock()
            .executions
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get(&self, id: ExecutionId) -> Result<Option<Execution>> {
        Ok(self.lock().executions.get(&id).cloned())
    }

    async fn claim_for_schedule(
        &self,
        retry_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Execution>> {
        let mut inner = self.lock();

        let candidate = inner
            .executions
            .values_mut()
            .filter(|execution| match execution.status {
                ExecutionStatus::New => true,
                ExecutionStatus::Scheduled => execution
                    .scheduled_at
                    .is_some_and(|scheduled_at| scheduled_at < retry_before),
                ExecutionStatus::Finished => false,
            })
            .min_by_key(|execution| execution.created_at);

        Ok(candidate.map(|execution| {
            execution.set_scheduled(now);
            execution.clone()
        }))
    }

    async fn save(&self, execution: &Execution, messages: &[Message]) -> Result<()> {
        let mut inner = self.lock();

        let Some(stored) = inner.executions.get_mut(&execution.id) else {
            return Err(RepositoryError::NotFound(execution.id));
        };
        stored.status = execution.status;
        stored.scheduled_at = execution.scheduled_at;
        stored.finished_at = execution.finished_at;

        for message in messages {
            inner.next_outbox_id += 1;
            let id = inner.next_outbox_id;
            inner.outbox.insert(
                id,
                OutboxEntry {
                    id,
                    message: message.clone(),
                    created_at: Utc::now(),
                    failed_at: None,
                    failed_tries: 0,
                },
            );
        }

        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryStore {
    async fn pending(&self, limit: i64) -> Result<Vec<OutboxEntry>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.lock().outbox.values().take(limit).cloned().collect())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.lock().outbox.remove(&id);
        Ok(())
    }

    async fn mark_failed(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(entry) = self.lock().outbox.get_mut(&id) {
            entry.failed_at = Some(at);
            entry.failed_tries += 1;
        }
        Ok(())
    }
}
