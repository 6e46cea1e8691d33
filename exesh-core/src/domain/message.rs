//! Events published for downstream consumers

use serde::{Deserialize, Serialize};

use crate::domain::id::ExecutionId;
use crate::domain::job::JobStatus;
use crate::domain::result::JobResult;

/// One significant transition of an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    ExecutionStarted {
        execution_id: ExecutionId,
    },
    CompileJob {
        execution_id: ExecutionId,
        job_name: String,
        status: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        compilation_error: Option<String>,
    },
    RunJob {
        execution_id: ExecutionId,
        job_name: String,
        status: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    CheckJob {
        execution_id: ExecutionId,
        job_name: String,
        status: JobStatus,
    },
    ExecutionFinished {
        execution_id: ExecutionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Message {
    /// Message describing `result` of the job named `job_name`
    pub fn for_result(execution_id: ExecutionId, job_name: &str, result: &JobResult) -> Self {
        let job_name = job_name.to_string();
        match result {
            JobResult::Compile(r) => Message::CompileJob {
                execution_id,
                job_name,
                status: r.status,
                compilation_error: r.compilation_error.clone(),
            },
            JobResult::Run(r) => Message::RunJob {
                execution_id,
                job_name,
                status: r.status,
                output: r.output.clone(),
            },
            JobResult::Check(r) => Message::CheckJob {
                execution_id,
                job_name,
                status: r.status,
            },
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        match self {
            Message::ExecutionStarted { execution_id }
            | Message::CompileJob { execution_id, .. }
            | Message::RunJob { execution_id, .. }
            | Message::CheckJob { execution_id, .. }
            | Message::ExecutionFinished { execution_id, .. } => *execution_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::JobId;

    #[test]
    fn test_message_for_run_result() {
        let execution_id = ExecutionId::new();
        let result = JobResult::run(JobId::new("r"), JobStatus::OK, Some("42\n".to_string()));

        let message = Message::for_result(execution_id, "run-1", &result);
        assert_eq!(
            message,
            Message::RunJob {
                execution_id,
                job_name: "run-1".to_string(),
                status: JobStatus::OK,
                output: Some("42\n".to_string()),
            }
        );
        assert_eq!(message.execution_id(), execution_id);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "run_job");
    }
}
