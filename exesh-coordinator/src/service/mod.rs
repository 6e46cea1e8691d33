//! Service Module
//!
//! Business logic layer for the coordinator.
//! Services sit between the HTTP handlers and the scheduling components.

pub mod execution;
pub mod heartbeat;

// Re-export for convenience
pub use execution as execution_service;
pub use heartbeat::HeartbeatService;
