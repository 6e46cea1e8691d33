//! Worker configuration
//!
//! Read from the YAML file named by `CONFIG_PATH` when it is set, otherwise
//! from individual environment variables. Unset values keep their defaults.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::Images;
use crate::scheduler::WorkerSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Public base URL of this worker; other workers download from it
    pub worker_id: String,

    /// Coordinator base URL (e.g., "http://localhost:8080")
    pub coordinator_url: String,

    /// Bind address of the artifact server
    pub listen_address: String,

    /// Jobs run at the same time
    pub slots: usize,

    pub heartbeat_interval_ms: u64,
    pub keepalive_interval_ms: u64,
    pub slot_interval_ms: u64,

    /// Bound on every call to the coordinator
    pub request_timeout_ms: u64,
    /// Bound on every artifact download from another worker
    pub download_timeout_ms: u64,

    /// Root directory of the local artifact store
    pub storage_root: PathBuf,
    pub artifact_ttl_secs: u64,
    pub gc_interval_secs: u64,

    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub poll_interval_ms: u64,
    pub cpp_image: String,
    pub go_image: String,
    pub python_image: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let images = Images::default();
        Self {
            poll_interval_ms: 50,
            cpp_image: images.cpp,
            go_image: images.go,
            python_image: images.python,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_id: "http://localhost:8081".to_string(),
            coordinator_url: "http://localhost:8080".to_string(),
            listen_address: "0.0.0.0:8081".to_string(),
            slots: 2,
            heartbeat_interval_ms: 500,
            keepalive_interval_ms: 3000,
            slot_interval_ms: 100,
            request_timeout_ms: 5000,
            download_timeout_ms: 60_000,
            storage_root: std::env::temp_dir().join("exesh-worker"),
            artifact_ttl_secs: 3600,
            gc_interval_secs: 60,
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Config {
    /// YAML at `CONFIG_PATH` when set, environment variables otherwise
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("CONFIG_PATH") {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::from_env()),
        }
    }

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

    /// Creates configuration from environment variables
    ///
    /// Recognized variables:
    /// - WORKER_ID, COORDINATOR_URL, LISTEN_ADDRESS
    /// - SLOTS
    /// - HEARTBEAT_INTERVAL_MS, KEEPALIVE_INTERVAL_MS, SLOT_INTERVAL_MS
    /// - REQUEST_TIMEOUT_MS, DOWNLOAD_TIMEOUT_MS
    /// - STORAGE_ROOT, ARTIFACT_TTL_SECS, GC_INTERVAL_SECS
    /// - RUNTIME_POLL_INTERVAL_MS, CPP_IMAGE, GO_IMAGE, PYTHON_IMAGE
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            worker_id: env_or("WORKER_ID", defaults.worker_id),
            coordinator_url: env_or("COORDINATOR_URL", defaults.coordinator_url),
            listen_address: env_or("LISTEN_ADDRESS", defaults.listen_address),
            slots: env_parse("SLOTS", defaults.slots),
            heartbeat_interval_ms: env_parse("HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval_ms),
            keepalive_interval_ms: env_parse("KEEPALIVE_INTERVAL_MS", defaults.keepalive_interval_ms),
            slot_interval_ms: env_parse("SLOT_INTERVAL_MS", defaults.slot_interval_ms),
            request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            download_timeout_ms: env_parse("DOWNLOAD_TIMEOUT_MS", defaults.download_timeout_ms),
            storage_root: std::env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            artifact_ttl_secs: env_parse("ARTIFACT_TTL_SECS", defaults.artifact_ttl_secs),
            gc_interval_secs: env_parse("GC_INTERVAL_SECS", defaults.gc_interval_secs),
            runtime: RuntimeConfig {
                poll_interval_ms: env_parse(
                    "RUNTIME_POLL_INTERVAL_MS",
                    defaults.runtime.poll_interval_ms,
                ),
                cpp_image: env_or("CPP_IMAGE", defaults.runtime.cpp_image),
                go_image: env_or("GO_IMAGE", defaults.runtime.go_image),
                python_image: env_or("PYTHON_IMAGE", defaults.runtime.python_image),
            },
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [
            ("worker_id", &self.worker_id),
            ("coordinator_url", &self.coordinator_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        if self.listen_address.is_empty() {
            anyhow::bail!("listen_address cannot be empty");
        }

        if self.slots == 0 {
            anyhow::bail!("slots must be greater than 0");
        }

        if self.heartbeat_interval_ms == 0
            || self.keepalive_interval_ms == 0
            || self.slot_interval_ms == 0
            || self.runtime.poll_interval_ms == 0
            || self.gc_interval_secs == 0
        {
            anyhow::bail!("intervals must be greater than 0");
        }

        if self.request_timeout_ms == 0 || self.download_timeout_ms == 0 {
            anyhow::bail!("timeouts must be greater than 0");
        }

        if self.artifact_ttl_secs == 0 {
            anyhow::bail!("artifact_ttl_secs must be greater than 0");
        }

        Ok(())
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            worker_id: self.worker_id.trim_end_matches('/').to_string(),
            slots: self.slots,
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            keepalive_interval: Duration::from_millis(self.keepalive_interval_ms),
            slot_interval: Duration::from_millis(self.slot_interval_ms),
        }
    }

    pub fn images(&self) -> Images {
        Images {
            cpp: self.runtime.cpp_image.clone(),
            go: self.runtime.go_image.clone(),
            python: self.runtime.python_image.clone(),
        }
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    pub fn runtime_poll_interval(&self) -> Duration {
        Duration::from_millis(self.runtime.poll_interval_ms)
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}
