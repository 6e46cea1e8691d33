//! Resolved stages

use serde::{Deserialize, Serialize};

use crate::domain::job::Job;

/// A stage whose job definitions were turned into [`Job`]s
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub deps: Vec<String>,
    pub jobs: Vec<Job>,
}
