//! Podman runtime
//!
//! Drives the `podman` CLI: a fresh container per command, created without
//! network and with memory, pids and cpu limits, started attached, watched
//! through `podman inspect` and always removed afterwards.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ExecuteParams, Output, Runtime, RuntimeError, WORKDIR, classify_exit, deadline};

const PODMAN: &str = "podman";

pub struct PodmanRuntime {
    /// Pause between state checks of a finished attach
    poll_interval: Duration,
}

impl PodmanRuntime {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Checks that podman is installed and answering
    pub async fn check_available(&self) -> Result<String, RuntimeError> {
        let output = run_podman(&["--version".to_string()]).await?;
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("Podman is available: {}", version);
        Ok(version)
    }

    async fn create(&self, command: &[String], params: &ExecuteParams) -> Result<Container, RuntimeError> {
        let name = format!("exesh-{}", Uuid::new_v4());
        let args = create_args(&name, command, params);
        let output = run_podman(&args).await?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("Created container {} ({})", name, id);
        Ok(Container::new(id))
    }

    async fn inspect(&self, id: &str) -> Result<ContainerState, RuntimeError> {
        let args = [
            "inspect".to_string(),
            "--format".to_string(),
            "{{.State.Running}} {{.State.ExitCode}} {{.State.OOMKilled}} \
             {{.State.StartedAt.UnixNano}} {{.State.FinishedAt.UnixNano}}"
                .to_string(),
            id.to_string(),
        ];
        let output = run_podman(&args).await?;
        let text = String::from_utf8_lossy(&output.stdout);
        parse_state(&text)
            .ok_or_else(|| RuntimeError::Command(format!("unexpected inspect output: {}", text.trim())))
    }
}

#[async_trait]
impl Runtime for PodmanRuntime {
    async fn execute(
        &self,
        command: &[String],
        params: ExecuteParams,
    ) -> Result<Output, RuntimeError> {
        let deadline_at = Instant::now() + deadline(&params.limits);
        let container = self.create(command, &params).await?;

        let result = self.run(&container, &params, deadline_at).await;
        container.remove().await;
        result
    }
}

impl PodmanRuntime {
    async fn run(
        &self,
        container: &Container,
        params: &ExecuteParams,
        deadline_at: Instant,
    ) -> Result<Output, RuntimeError> {
        for file in &params.in_files {
            run_podman(&[
                "cp".to_string(),
                file.outside.display().to_string(),
                format!("{}:{}", container.id, file.inside),
            ])
            .await?;
        }

        let mut start = Command::new(PODMAN);
        start.arg("start").arg("-a");
        if params.stdin.is_some() {
            start.arg("-i");
        }
        let mut child = start
            .arg(&container.id)
            .stdin(if params.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let (Some(input), Some(mut pipe)) = (params.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                // the program may exit without reading everything
                let _ = pipe.write_all(input.as_bytes()).await;
                let _ = pipe.shutdown().await;
            });
        }

        let attached = match tokio::time::timeout_at(deadline_at, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                debug!("Container {} passed its deadline", container.id);
                return Err(RuntimeError::Timeout);
            }
        };

        let state = loop {
            let state = self.inspect(&container.id).await?;
            if !state.running {
                break state;
            }
            if Instant::now() >= deadline_at {
                return Err(RuntimeError::Timeout);
            }
            tokio::time::sleep(self.poll_interval).await;
        };

        let output = classify_exit(
            state.exit_code,
            state.oom_killed,
            state.elapsed(),
            &params.limits,
            String::from_utf8_lossy(&attached.stdout).to_string(),
            String::from_utf8_lossy(&attached.stderr).to_string(),
        )?;

        for file in &params.out_files {
            run_podman(&[
                "cp".to_string(),
                format!("{}:{}", container.id, file.inside),
                file.outside.display().to_string(),
            ])
            .await?;
        }

        Ok(output)
    }
}

/// A created container, removed by [`Container::remove`]
///
/// If the owning future is dropped before that, removal is handed to a
/// background task instead.
struct Container {
    id: String,
    removed: bool,
}

impl Container {
    fn new(id: String) -> Self {
        Self { id, removed: false }
    }

    async fn remove(mut self) {
        self.removed = true;
        remove_container(&self.id).await;
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_container(&id).await });
            }
            Err(_) => warn!("Container {} left behind: no runtime to remove it", id),
        }
    }
}

async fn remove_container(id: &str) {
    match run_podman(&rm_args(id)).await {
        Ok(_) => debug!("Container {} removed", id),
        Err(e) => warn!("Failed to remove container {}: {}", id, e),
    }
}

fn rm_args(id: &str) -> [String; 3] {
    ["rm".to_string(), "-f".to_string(), id.to_string()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContainerState {
    running: bool,
    exit_code: i64,
    oom_killed: bool,
    started_ns: i64,
    finished_ns: i64,
}

impl ContainerState {
    /// Wall time of the container process
    fn elapsed(&self) -> Duration {
        let nanos = self.finished_ns.saturating_sub(self.started_ns).max(0);
        Duration::from_nanos(nanos as u64)
    }
}

fn parse_state(text: &str) -> Option<ContainerState> {
    let mut parts = text.split_whitespace();
    let running = parts.next()?.parse().ok()?;
    let exit_code = parts.next()?.parse().ok()?;
    let oom_killed = parts.next()?.parse().ok()?;
    let started_ns = parts.next()?.parse().ok()?;
    let finished_ns = parts.next()?.parse().ok()?;
    Some(ContainerState {
        running,
        exit_code,
        oom_killed,
        started_ns,
        finished_ns,
    })
}

fn create_args(name: &str, command: &[String], params: &ExecuteParams) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "create".into(),
        "--name".into(),
        name.into(),
        "--network".into(),
        "none".into(),
        "-w".into(),
        WORKDIR.into(),
    ];

    if let Some(memory) = params.limits.memory {
        args.push("--memory".into());
        args.push(format!("{}m", memory));
        args.push("--memory-swap".into());
        args.push(format!("{}m", memory));
    }

    if let Some(processes) = params.limits.processes {
        args.push("--pids-limit".into());
        args.push(processes.to_string());
    }

    if let Some(time) = params.limits.time {
        // whole seconds only; the exact limit is applied to the measured time
        // soft limit raises SIGXCPU, the hard one a second later kills
        let soft = time.as_secs_f64().ceil().max(1.0) as u64;
        args.push("--ulimit".into());
        args.push(format!("cpu={}:{}", soft, soft + 1));
    }

    if params.stdin.is_some() {
        args.push("-i".into());
    }

    for (key, value) in &params.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }

    args.push(params.image.clone());
    args.extend(command.iter().cloned());
    args
}

async fn run_podman(args: &[String]) -> Result<std::process::Output, RuntimeError> {
    let output = Command::new(PODMAN)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| RuntimeError::Command(format!("failed to run podman: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RuntimeError::Command(format!(
            "podman {} failed: {}",
            args.first().map(String::as_str).unwrap_or_default(),
            stderr.trim()
        )));
    }

    Ok(output)
}
