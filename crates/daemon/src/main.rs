//! Conveyor - job scheduler daemon
//!
//! Composition root: settings, logging, store selection, queue registration,
//! crash recovery, worker pools and the JSON-RPC surface.

mod handlers;
mod logging;
mod settings;
mod telemetry;

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use conveyor_api_rpc::{RpcServer, RpcServerConfig};
use conveyor_core::application::worker::constants::DEFAULT_EVENT_CAPACITY;
use conveyor_core::application::{log_events, EventBus, QueueManager, QueueRegistry, SubmitOptions};
use conveyor_core::port::{JobRepository, SystemTimeProvider, TimeProvider, UuidProvider};
use conveyor_infra_memory::{InMemoryBroker, InMemoryJobRepository};
use conveyor_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository};

use handlers::{CleanupHandler, EchoHandler, CLEANUP_JOB_TYPE, ECHO_JOB_TYPE};
use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const CLEANUP_QUEUE: &str = "cleanup";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Settings and logging
    let settings = Settings::load()?;
    let _log_guard = logging::init(settings.log_format, settings.log_dir.as_deref())?;

    info!("Conveyor v{} starting...", VERSION);

    // 2. Job record store
    let job_repo = open_store(&settings).await?;

    // 3. Wiring
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let events = Arc::new(EventBus::new(DEFAULT_EVENT_CAPACITY));
    tokio::spawn(log_events(events.subscribe()));

    let manager = Arc::new(QueueManager::new(
        Arc::new(QueueRegistry::new()),
        Arc::clone(&job_repo),
        Arc::new(InMemoryBroker::new()),
        events,
        Arc::new(UuidProvider),
        Arc::clone(&time_provider),
    ));

    manager
        .register_handler(
            CLEANUP_JOB_TYPE,
            Arc::new(CleanupHandler::new(
                Arc::clone(&job_repo),
                Arc::clone(&time_provider),
                settings.cleanup.retention_days,
            )),
        )
        .await;
    manager
        .register_handler(ECHO_JOB_TYPE, Arc::new(EchoHandler))
        .await;

    for (name, config) in settings.queue_configs() {
        manager
            .register_queue(&name, config)
            .await
            .with_context(|| format!("failed to register queue '{}'", name))?;
    }

    // 4. Crash recovery
    info!("Running crash recovery...");
    match manager.recover().await {
        Ok(report) => info!(
            repushed = report.repushed,
            orphaned = report.orphaned,
            retries = report.retries,
            cancelled = report.cancelled,
            "Crash recovery completed"
        ),
        Err(e) => error!(error = %e, "Crash recovery failed"),
    }

    // 5. Workers
    manager.start().await;

    // 6. JSON-RPC server
    let rpc_config = RpcServerConfig {
        host: settings.rpc.host.clone(),
        port: settings.rpc.port,
    };
    let (rpc_addr, rpc_handle) = RpcServer::new(rpc_config, Arc::clone(&manager))
        .start()
        .await
        .map_err(|e| anyhow!("RPC server start failed: {}", e))?;

    // 7. Periodic retention cleanup
    if let Some(interval) = settings.cleanup.interval() {
        tokio::spawn(schedule_cleanup(Arc::clone(&manager), interval));
    }

    info!(rpc = %rpc_addr, "System ready. Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 9. Graceful shutdown: stop accepting requests, then drain workers
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    rpc_handle.stopped().await;
    manager.shutdown().await;

    info!("Shutdown complete.");
    Ok(())
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn JobRepository>> {
    if settings.is_memory_store() {
        warn!("Using in-memory job store; jobs will not survive a restart");
        return Ok(Arc::new(InMemoryJobRepository::new()));
    }

    info!(database_url = %settings.database_url, "Initializing database...");
    if let Some(parent) = std::path::Path::new(&settings.database_url).parent() {
        if !parent.as_os_str().is_empty() && !settings.database_url.starts_with("sqlite:") {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let pool = create_pool(&settings.database_url)
        .await
        .context("DB pool creation failed")?;
    let version = run_migrations(&pool).await.context("Migration failed")?;
    info!(schema_version = version, "Database ready");

    Ok(Arc::new(SqliteJobRepository::new(pool)))
}

/// Submit a cleanup job every `interval` while the cleanup queue exists
async fn schedule_cleanup(manager: Arc<QueueManager>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // first tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !manager.registry().contains(CLEANUP_QUEUE).await {
            continue;
        }
        match manager
            .submit(
                CLEANUP_QUEUE,
                CLEANUP_JOB_TYPE,
                serde_json::Value::Null,
                SubmitOptions::default(),
            )
            .await
        {
            Ok(job_id) => info!(job_id = %job_id, "Scheduled retention cleanup"),
            Err(e) => warn!(error = %e, "Failed to schedule retention cleanup"),
        }
    }
}
