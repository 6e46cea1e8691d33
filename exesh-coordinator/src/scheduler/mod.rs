//! Scheduling
//!
//! `JobScheduler` matches ready jobs against worker pulls. `ExecutionScheduler`
//! admits stored executions and drives each one through its stage graph.

pub mod execution;
pub mod jobs;

pub use execution::{ExecutionScheduler, SchedulerSettings};
pub use jobs::{JobCallback, JobScheduler};
