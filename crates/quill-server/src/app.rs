//! Process wiring for each run mode.

use crate::webhook::WebhookHandler;
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusHandle;
use quill_config::AppConfig;
use quill_jobs::{create_pool, JobQueue, RedisStore, Store, WorkerPool, WorkerSettings};
use quill_rest::{create_router, AppState};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Runs the API and/or worker pool selected by `app.mode` until a shutdown
/// signal arrives.
pub async fn run(config: AppConfig, metrics: Option<PrometheusHandle>) -> anyhow::Result<()> {
    let pool = create_pool(&config.redis)
        .await
        .context("Failed to connect to Redis")?;
    let store: Arc<dyn Store> = Arc::new(RedisStore::new(pool));
    let queue = JobQueue::from_config(store, &config.queue);

    let mode = config.app.mode;
    let workers = if mode.runs_workers() {
        Some(start_workers(&config, queue.clone())?)
    } else {
        None
    };

    let served = if mode.serves_api() {
        serve_api(&config, queue, metrics).await
    } else {
        shutdown_signal().await;
        Ok(())
    };

    if let Some(workers) = workers {
        workers.shutdown().await;
    }

    served?;
    info!("Server shutdown complete");
    Ok(())
}

fn start_workers(config: &AppConfig, queue: JobQueue) -> anyhow::Result<WorkerPool> {
    let handler = WebhookHandler::new(&config.handlers)?;
    if handler.job_types().next().is_none() {
        warn!("No handler endpoints configured; every claimed job will fail");
    }
    for job_type in handler.job_types() {
        info!(job_type, "Handler endpoint registered");
    }

    let pool = WorkerPool::new(
        WorkerPool::generate_id(),
        queue,
        Arc::new(handler),
        WorkerSettings::from(&config.worker),
    );
    pool.start();
    Ok(pool)
}

async fn serve_api(
    config: &AppConfig,
    queue: JobQueue,
    metrics: Option<PrometheusHandle>,
) -> anyhow::Result<()> {
    let mut state = AppState::new(queue);
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }
    let router = create_router(state, &config.server, &config.observability.metrics_path);

    let addr = config.server.addr();
    info!("Starting REST server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind REST listener on {}", addr))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("REST server error")
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
