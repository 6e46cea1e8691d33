//! Coordinator configuration
//!
//! Loaded from the YAML file named by `CONFIG_PATH`. Every section has
//! defaults, so a file only needs the values it changes.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::outbox::SenderSettings;
use crate::scheduler::SchedulerSettings;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub worker_pool: WorkerPoolConfig,
    pub artifacts: ArtifactsConfig,
    pub sender: SenderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Postgres connection string; executions are kept in memory when unset
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
    pub max_concurrency: usize,
    /// Seconds after which an unsaved scheduled execution is claimed again
    pub retry_after_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_concurrency: 16,
            retry_after_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// A worker silent for this long is considered dead
    pub die_after_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            die_after_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// How long workers keep produced artifacts
    pub ttl_secs: u64,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub poll_interval_ms: u64,
    pub batch_size: i64,
    /// Messages are only logged when unset
    pub webhook_url: Option<String>,
    /// Bound on each delivery attempt
    pub webhook_timeout_ms: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            batch_size: 100,
            webhook_url: None,
            webhook_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Reads configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Reads the file named by `CONFIG_PATH`
    pub fn from_env() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_PATH")
            .map_err(|_| anyhow::anyhow!("CONFIG_PATH environment variable not set"))?;
        Self::from_file(path)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.address.is_empty() {
            anyhow::bail!("server.address cannot be empty");
        }

        if self.storage.connection_string.as_deref() == Some("") {
            anyhow::bail!("storage.connection_string cannot be empty when set");
        }

        if self.scheduler.poll_interval_ms == 0 {
            anyhow::bail!("scheduler.poll_interval_ms must be greater than 0");
        }

        if self.scheduler.max_concurrency == 0 {
            anyhow::bail!("scheduler.max_concurrency must be greater than 0");
        }

        if self.scheduler.retry_after_secs == 0 {
            anyhow::bail!("scheduler.retry_after_secs must be greater than 0");
        }

        if self.worker_pool.die_after_ms == 0 {
            anyhow::bail!("worker_pool.die_after_ms must be greater than 0");
        }

        if self.artifacts.ttl_secs == 0 {
            anyhow::bail!("artifacts.ttl_secs must be greater than 0");
        }

        if self.sender.poll_interval_ms == 0 {
            anyhow::bail!("sender.poll_interval_ms must be greater than 0");
        }

        if self.sender.batch_size <= 0 {
            anyhow::bail!("sender.batch_size must be greater than 0");
        }

        if let Some(url) = &self.sender.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("sender.webhook_url must start with http:// or https://");
            }
        }

        if self.sender.webhook_timeout_ms == 0 {
            anyhow::bail!("sender.webhook_timeout_ms must be greater than 0");
        }

        Ok(())
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: Duration::from_millis(self.scheduler.poll_interval_ms),
            max_concurrency: self.scheduler.max_concurrency,
            retry_after: Duration::from_secs(self.scheduler.retry_after_secs),
        }
    }

    pub fn sender_settings(&self) -> SenderSettings {
        SenderSettings {
            poll_interval: Duration::from_millis(self.sender.poll_interval_ms),
            batch_size: self.sender.batch_size,
        }
    }

    pub fn die_after(&self) -> Duration {
        Duration::from_millis(self.worker_pool.die_after_ms)
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifacts.ttl_secs)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.sender.webhook_timeout_ms)
    }
}
