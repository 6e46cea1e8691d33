//! Execution command handlers

use anyhow::{Context, Result};
use colored::*;
use exesh_client::CoordinatorClient;
use exesh_core::domain::{Execution, ExecutionId, ExecutionStatus};
use exesh_core::dto::execution::{ExecuteRequest, ExecutionSummary};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Submit a definition file and print the execution ID
pub async fn submit(config: &crate::config::Config, file: &Path, wait: bool) -> Result<()> {
    let request = read_definition(file)?;
    let client = CoordinatorClient::new(&config.coordinator_url);

    println!(
        "{}",
        format!(
            "Submitting {} stage(s) with {} source(s)...",
            request.stages.len(),
            request.sources.len()
        )
        .dimmed()
    );

    let response = client
        .execute(&request)
        .await
        .context("Failed to submit execution")?;

    println!("{} {}", "✓ Execution submitted:".green(), response.execution_id.to_string().cyan());

    if wait {
        let execution = wait_finished(&client, response.execution_id).await?;
        println!();
        print_execution(&execution);
    }

    Ok(())
}

/// Print the status of one execution
pub async fn status(config: &crate::config::Config, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let client = CoordinatorClient::new(&config.coordinator_url);

    let execution = client
        .get_execution(id)
        .await
        .with_context(|| format!("Failed to get execution {}", id))?;

    print_execution(&execution);
    Ok(())
}

fn read_definition(file: &Path) -> Result<ExecuteRequest> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let request: ExecuteRequest = serde_json::from_str(&content)
        .with_context(|| format!("Invalid execution definition in {}", file.display()))?;

    if request.stages.is_empty() {
        anyhow::bail!("{} defines no stages", file.display());
    }
    Ok(request)
}

fn parse_id(id: &str) -> Result<ExecutionId> {
    let uuid = Uuid::parse_str(id).with_context(|| format!("Invalid execution ID: {}", id))?;
    Ok(ExecutionId(uuid))
}

async fn wait_finished(client: &CoordinatorClient, id: ExecutionId) -> Result<Execution> {
    println!("{}", "Waiting for the execution to finish...".dimmed());
    loop {
        let execution = client.get_execution(id).await?;
        if execution.is_finished() {
            return Ok(execution);
        }
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
}

fn print_execution(execution: &Execution) {
    let stages: Vec<&str> = execution.stages.iter().map(|s| s.name.as_str()).collect();
    let summary = ExecutionSummary::from(execution.clone());

    println!("{}", "Execution Details:".bold());
    println!("  ID:         {}", summary.id.to_string().cyan());
    println!("  Status:     {}", colorize_status(summary.status));
    println!("  Stages:     {} ({})", summary.stage_count, stages.join(", "));
    println!(
        "  Created:    {}",
        summary.created_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(scheduled) = summary.scheduled_at {
        println!("  Scheduled:  {}", scheduled.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(finished) = summary.finished_at {
        println!("  Finished:   {}", finished.format("%Y-%m-%d %H:%M:%S"));

        let duration = finished.signed_duration_since(summary.created_at);
        println!("  Duration:   {}ms", duration.num_milliseconds());
    }
}

fn colorize_status(status: ExecutionStatus) -> ColoredString {
    let text = status.as_str();
    match status {
        ExecutionStatus::New => text.yellow(),
        ExecutionStatus::Scheduled => text.cyan(),
        ExecutionStatus::Finished => text.green(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("exesh-cli-{}.json", Uuid::new_v4()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_id() {
        let uuid = Uuid::new_v4();
        assert_eq!(parse_id(&uuid.to_string()).unwrap(), ExecutionId(uuid));
        assert!(parse_id("abc").is_err());
    }

    #[test]
    fn test_read_definition_rejects_empty_stages() {
        let path = write_temp(r#"{"stages": []}"#);
        assert!(read_definition(&path).is_err());
    }

    #[test]
    fn test_read_definition_rejects_garbage() {
        let path = write_temp("not json");
        let error = read_definition(&path).unwrap_err();
        assert!(format!("{:#}", error).contains("Invalid execution definition"));
    }
}
