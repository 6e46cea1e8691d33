//! Sandboxed runtime
//!
//! A [`Runtime`] runs one command in isolation under resource limits, with
//! files copied in before and out after. Limit violations are distinct error
//! variants so executors can map them to verdicts.

pub mod podman;

pub use podman::PodmanRuntime;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Working directory of every sandbox
pub const WORKDIR: &str = "/tmp";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Limits {
    /// Megabytes
    pub memory: Option<u64>,
    pub time: Option<Duration>,
    pub processes: Option<u32>,
}

/// A file shared between host and sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Absolute path inside the sandbox
    pub inside: String,
    pub outside: PathBuf,
}

impl File {
    pub fn new(inside: impl Into<String>, outside: impl Into<PathBuf>) -> Self {
        Self {
            inside: inside.into(),
            outside: outside.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecuteParams {
    /// Container image to run in
    pub image: String,
    pub limits: Limits,
    pub in_files: Vec<File>,
    pub out_files: Vec<File>,
    pub stdin: Option<String>,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("time limit exceeded")]
    Timeout,

    #[error("memory limit exceeded")]
    OutOfMemory,

    #[error("process exited with code {code}")]
    NonZeroExit {
        code: i64,
        stdout: String,
        stderr: String,
    },

    #[error("sandbox command failed: {0}")]
    Command(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Runtime: Send + Sync {
    async fn execute(&self, command: &[String], params: ExecuteParams)
    -> Result<Output, RuntimeError>;
}

/// How long a sandbox may run before it is killed
///
/// Ten times the time limit leaves room for a program blocked on I/O; CPU
/// time is enforced separately.
pub fn deadline(limits: &Limits) -> Duration {
    match limits.time {
        Some(time) if !time.is_zero() => time * 10,
        _ => Duration::from_secs(30),
    }
}

/// Maps a finished sandbox to success or a limit violation
///
/// `elapsed` is the wall time of the sandboxed process. The cpu ulimit only
/// counts whole seconds, so the exact time limit is checked against it here.
pub fn classify_exit(
    code: i64,
    oom_killed: bool,
    elapsed: Duration,
    limits: &Limits,
    stdout: String,
    stderr: String,
) -> Result<Output, RuntimeError> {
    if code == 137 && oom_killed {
        return Err(RuntimeError::OutOfMemory);
    }
    if limits.time.is_some_and(|time| !time.is_zero() && elapsed > time) {
        return Err(RuntimeError::Timeout);
    }

    match code {
        0 => Ok(Output { stdout, stderr }),
        // SIGKILL without OOM, or SIGXCPU from the cpu ulimit
        137 | 152 => Err(RuntimeError::Timeout),
        _ => Err(RuntimeError::NonZeroExit {
            code,
            stdout,
            stderr,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(code: i64, oom: bool) -> Result<Output, RuntimeError> {
        classify_exit(
            code,
            oom,
            Duration::from_millis(10),
            &Limits::default(),
            "out".to_string(),
            "err".to_string(),
        )
    }

    fn classify_timed(code: i64, elapsed_ms: u64, limit_ms: u64) -> Result<Output, RuntimeError> {
        let limits = Limits {
            time: Some(Duration::from_millis(limit_ms)),
            ..Limits::default()
        };
        classify_exit(
            code,
            false,
            Duration::from_millis(elapsed_ms),
            &limits,
            String::new(),
            String::new(),
        )
    }

    #[test]
    fn test_classify_exit() {
        assert_eq!(
            classify(0, false).unwrap(),
            Output {
                stdout: "out".to_string(),
                stderr: "err".to_string()
            }
        );
        assert!(matches!(classify(137, true), Err(RuntimeError::OutOfMemory)));
        assert!(matches!(classify(137, false), Err(RuntimeError::Timeout)));
        assert!(matches!(classify(152, false), Err(RuntimeError::Timeout)));
        assert!(matches!(
            classify(1, false),
            Err(RuntimeError::NonZeroExit { code: 1, ref stderr, .. }) if stderr == "err"
        ));
        // OOM flag only matters for SIGKILL
        assert!(matches!(
            classify(139, true),
            Err(RuntimeError::NonZeroExit { code: 139, .. })
        ));
    }

    #[test]
    fn test_time_limit_is_exact() {
        // within the cpu ulimit second but past the configured limit
        assert!(matches!(classify_timed(0, 1700, 1500), Err(RuntimeError::Timeout)));
        assert!(matches!(classify_timed(1, 1700, 1500), Err(RuntimeError::Timeout)));
        assert!(classify_timed(0, 1400, 1500).is_ok());
        assert!(classify_timed(0, 1500, 1500).is_ok());
        assert!(matches!(
            classify_timed(1, 100, 1500),
            Err(RuntimeError::NonZeroExit { code: 1, .. })
        ));
    }

    #[test]
    fn test_memory_wins_over_time() {
        let limits = Limits {
            time: Some(Duration::from_millis(100)),
            ..Limits::default()
        };
        let result = classify_exit(
            137,
            true,
            Duration::from_secs(1),
            &limits,
            String::new(),
            String::new(),
        );
        assert!(matches!(result, Err(RuntimeError::OutOfMemory)));
    }

    #[test]
    fn test_deadline() {
        let limits = Limits {
            time: Some(Duration::from_millis(1500)),
            ..Limits::default()
        };
        assert_eq!(deadline(&limits), Duration::from_secs(15));
        assert_eq!(deadline(&Limits::default()), Duration::from_secs(30));
        assert_eq!(
            deadline(&Limits {
                time: Some(Duration::ZERO),
                ..Limits::default()
            }),
            Duration::from_secs(30)
        );
    }
}
