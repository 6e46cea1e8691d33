//! Configuration module

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the coordinator service
    pub coordinator_url: String,
}
