//! Core domain types
//!
//! This module contains the domain structures shared by the coordinator and
//! the workers. Polymorphic types are closed enums tagged by a `type` field.

pub mod definition;
pub mod execution;
pub mod id;
pub mod input;
pub mod job;
pub mod message;
pub mod result;
pub mod source;
pub mod stage;

pub use definition::{InputDefinition, JobDefinition, SourceDefinition, StageDefinition};
pub use execution::{Execution, ExecutionStatus};
pub use id::{BucketId, ExecutionId, JobId, SourceId};
pub use input::{Input, Output};
pub use job::{Job, JobKind, JobStatus};
pub use message::Message;
pub use result::JobResult;
pub use source::Source;
pub use stage::Stage;
