use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod factory;
pub mod graph;
pub mod metrics;
pub mod outbox;
pub mod pool;
pub mod registry;
pub mod repository;
pub mod scheduler;
pub mod service;

use crate::config::Config;
use crate::metrics::Metrics;
use crate::outbox::{LogPublisher, MessagePublisher, OutboxSender, WebhookPublisher};
use crate::pool::WorkerPool;
use crate::registry::ArtifactRegistry;
use crate::repository::{ExecutionRepository, InMemoryStore, OutboxRepository, PgStore};
use crate::scheduler::{ExecutionScheduler, JobScheduler};
use crate::service::HeartbeatService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exesh_coordinator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Exesh Coordinator...");

    let config = Config::from_env()?;
    config.validate().context("Invalid configuration")?;

    let (executions, outbox) = open_storage(&config).await?;

    let (pool, expired) = WorkerPool::new(config.die_after());
    let pool = Arc::new(pool);
    let jobs = Arc::new(JobScheduler::new());
    let registry = Arc::new(ArtifactRegistry::new(Arc::clone(&pool)));

    spawn_expiry_handler(expired, Arc::clone(&jobs), Arc::clone(&registry));

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    let scheduler = ExecutionScheduler::new(
        Arc::clone(&executions),
        Arc::clone(&jobs),
        Arc::clone(&registry),
        metrics.executions_in_flight.clone(),
        config.scheduler_settings(),
    );
    tokio::spawn(async move { scheduler.run().await });

    let publisher: Arc<dyn MessagePublisher> = match &config.sender.webhook_url {
        Some(url) => {
            tracing::info!("Publishing messages to {}", url);
            Arc::new(
                WebhookPublisher::new(url.clone(), config.webhook_timeout())
                    .context("Failed to build the webhook client")?,
            )
        }
        None => {
            tracing::info!("No webhook configured, messages will be logged");
            Arc::new(LogPublisher)
        }
    };
    let sender = OutboxSender::new(outbox, publisher, config.sender_settings());
    tokio::spawn(async move { sender.run().await });

    let heartbeat = HeartbeatService::new(
        Arc::clone(&pool),
        Arc::clone(&jobs),
        Arc::clone(&registry),
        config.artifact_ttl(),
    );

    // Build router with all API endpoints
    let app = api::create_router(api::AppState {
        store: executions,
        heartbeat: Arc::new(heartbeat),
        metrics,
    });

    tracing::info!("Listening on {}", config.server.address);

    let listener = tokio::net::TcpListener::bind(&config.server.address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.address))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    pool.shutdown();
    Ok(())
}

/// Postgres when a connection string is configured, memory otherwise
async fn open_storage(
    config: &Config,
) -> anyhow::Result<(Arc<dyn ExecutionRepository>, Arc<dyn OutboxRepository>)> {
    let Some(database_url) = &config.storage.connection_string else {
        tracing::warn!("No storage configured, executions are kept in memory");
        let store = Arc::new(InMemoryStore::new());
        let executions: Arc<dyn ExecutionRepository> = store.clone();
        let outbox: Arc<dyn OutboxRepository> = store;
        return Ok((executions, outbox));
    };

    tracing::info!("Connecting to database...");

    let pool = db::create_pool(database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store = Arc::new(PgStore::new(pool));
    let executions: Arc<dyn ExecutionRepository> = store.clone();
    let outbox: Arc<dyn OutboxRepository> = store;
    Ok((executions, outbox))
}

/// Requeues the jobs of dead workers and forgets their artifacts
fn spawn_expiry_handler(
    mut expired: mpsc::UnboundedReceiver<String>,
    jobs: Arc<JobScheduler>,
    registry: Arc<ArtifactRegistry>,
) {
    tokio::spawn(async move {
        while let Some(worker_id) = expired.recv().await {
            registry.forget_worker(&worker_id);
            let requeued = jobs.requeue_worker(&worker_id);
            tracing::info!(
                "Worker {} removed from the pool, {} job(s) requeued",
                worker_id,
                requeued
            );
        }
    });
}
