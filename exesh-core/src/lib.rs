//! Exesh Core
//!
//! Core types shared by the Exesh coordinator, workers and clients.
//!
//! This crate contains:
//! - Domain types: jobs, inputs, sources, results, executions, messages
//! - DTOs: request and response bodies of the coordinator API

pub mod domain;
pub mod dto;
