//! # Quill Server
//!
//! Entry point for the `quill-server` binary. `app.mode` selects what the
//! process runs:
//! - **all**: producer REST API and worker pool
//! - **api**: producer REST API only
//! - **worker**: worker pool only

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use quill_config::ConfigLoader;
use quill_core::init_tracing;
use quill_jobs::register_metrics;
use quill_server::{app, startup};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_loader = ConfigLoader::from_default_location().context("Failed to load configuration")?;
    let config = config_loader.get().await;

    init_tracing(&config.observability.log_level, config.observability.log_format);
    startup::print_banner();
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    startup::print_startup_info(&config);

    let metrics = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        register_metrics();
        Some(handle)
    } else {
        None
    };

    if let Err(e) = app::run(config, metrics).await {
        error!("Application error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
