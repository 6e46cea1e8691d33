//! Data Transfer Objects for inter-service communication
//!
//! Request and response bodies exchanged between workers, clients and the
//! coordinator.

pub mod execution;
pub mod heartbeat;
