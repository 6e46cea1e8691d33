//! Execution domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::definition::{SourceDefinition, StageDefinition};
use crate::domain::id::ExecutionId;

/// Lifecycle of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    New,
    Scheduled,
    Finished,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::New => "new",
            ExecutionStatus::Scheduled => "scheduled",
            ExecutionStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ExecutionStatus::New),
            "scheduled" => Ok(ExecutionStatus::Scheduled),
            "finished" => Ok(ExecutionStatus::Finished),
            other => Err(format!("unknown execution status: {}", other)),
        }
    }
}

/// Root aggregate owned by the coordinator
///
/// Records are append-only history: they move forward through
/// `new -> scheduled -> finished` and are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub sources: Vec<SourceDefinition>,
    pub stages: Vec<StageDefinition>,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn new(sources: Vec<SourceDefinition>, stages: Vec<StageDefinition>) -> Self {
        Self {
            id: ExecutionId::new(),
            sources,
            stages,
            status: ExecutionStatus::New,
            created_at: Utc::now(),
            scheduled_at: None,
            finished_at: None,
        }
    }

    pub fn set_scheduled(&mut self, now: DateTime<Utc>) {
        self.status = ExecutionStatus::Scheduled;
        self.scheduled_at = Some(now);
    }

    /// Refreshes `scheduled_at` so the execution is not reclaimed while in progress
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if self.status == ExecutionStatus::Scheduled {
            self.scheduled_at = Some(now);
        }
    }

    pub fn set_finished(&mut self, now: DateTime<Utc>) {
        self.status = ExecutionStatus::Finished;
        self.finished_at = Some(now);
    }

    pub fn is_finished(&self) -> bool {
        self.status == ExecutionStatus::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut execution = Execution::new(Vec::new(), Vec::new());
        assert_eq!(execution.status, ExecutionStatus::New);

        let scheduled = Utc::now();
        execution.set_scheduled(scheduled);
        assert_eq!(execution.status, ExecutionStatus::Scheduled);
        assert_eq!(execution.scheduled_at, Some(scheduled));

        let later = scheduled + chrono::Duration::seconds(5);
        execution.touch(later);
        assert_eq!(execution.scheduled_at, Some(later));

        execution.set_finished(later);
        assert!(execution.is_finished());

        // touching a finished execution keeps its schedule time
        execution.touch(later + chrono::Duration::seconds(5));
        assert_eq!(execution.scheduled_at, Some(later));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            ExecutionStatus::New,
            ExecutionStatus::Scheduled,
            ExecutionStatus::Finished,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>(), Ok(status));
        }
        assert!("running".parse::<ExecutionStatus>().is_err());
    }
}
