//! Exesh Worker
//!
//! Runs jobs handed out by the coordinator in Podman sandboxes.
//!
//! Architecture:
//! - Filestorage: local artifact store with reserve/commit/abort and GC
//! - Providers: sources, inputs and outputs on top of the store
//! - Runtime and executors: sandboxed commands and their verdicts
//! - Scheduler: heartbeat and slot duties
//! - API: serves committed artifacts to other workers

mod api;
mod config;
mod executor;
mod filestorage;
mod provider;
mod runtime;
mod scheduler;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::executor::{Executors, JobExecutor};
use crate::filestorage::FileStorage;
use crate::provider::{FilestorageAdapter, InputProvider, OutputProvider, SourceProvider};
use crate::runtime::PodmanRuntime;
use crate::scheduler::{HeartbeatClient, Worker};
use exesh_client::{ArtifactClient, CoordinatorClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exesh_worker=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Exesh Worker");

    let config = Config::load()?;
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: worker_id={}, coordinator_url={}, slots={}",
        config.worker_id, config.coordinator_url, config.slots
    );

    let storage = FileStorage::open(config.storage_root.clone()).with_context(|| {
        format!(
            "Failed to open storage at {}",
            config.storage_root.display()
        )
    })?;
    tokio::spawn(Arc::clone(&storage).run_gc(config.gc_interval()));

    let ttl = config.artifact_ttl();
    let adapter = Arc::new(FilestorageAdapter::new(
        Arc::clone(&storage),
        ArtifactClient::with_timeout(config.download_timeout())
            .context("Failed to build the artifact client")?,
        ttl,
    ));
    let sources = Arc::new(SourceProvider::new(Arc::clone(&adapter), ttl));
    let inputs = Arc::new(InputProvider::new(Arc::clone(&adapter), Arc::clone(&sources)));
    let outputs = Arc::new(OutputProvider::new(adapter, ttl));

    let runtime = PodmanRuntime::new(config.runtime_poll_interval());
    runtime
        .check_available()
        .await
        .context("Podman is required to run jobs")?;

    let executor: Arc<dyn JobExecutor> = Arc::new(Executors::new(
        Arc::new(runtime),
        inputs,
        outputs,
        config.images(),
    ));
    let client: Arc<dyn HeartbeatClient> = Arc::new(
        CoordinatorClient::with_timeout(config.coordinator_url.clone(), config.request_timeout())
            .context("Failed to build the coordinator client")?,
    );

    let worker = Arc::new(Worker::new(
        config.worker_settings(),
        client,
        sources,
        executor,
    ));
    tokio::spawn(worker.run());

    let app = api::create_router(api::AppState { storage });

    info!("Serving artifacts on {}", config.listen_address);

    let listener = tokio::net::TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_address))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
