//! Execution DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Execution, ExecutionId, ExecutionStatus, SourceDefinition, StageDefinition};

/// Request to run a set of stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub sources: Vec<SourceDefinition>,
    pub stages: Vec<StageDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub execution_id: ExecutionId,
}

/// Summary information about an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub id: ExecutionId,
    pub status: ExecutionStatus,
    pub stage_count: usize,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Execution> for ExecutionSummary {
    fn from(execution: Execution) -> Self {
        ExecutionSummary {
            id: execution.id,
            status: execution.status,
            stage_count: execution.stages.len(),
            created_at: execution.created_at,
            scheduled_at: execution.scheduled_at,
            finished_at: execution.finished_at,
        }
    }
}
