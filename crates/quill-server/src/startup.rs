//! Server startup utilities.

use quill_config::AppConfig;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(
        r#"
   ____        _ ____
  / __ \__  __(_) / /
 / / / / / / / / / /
/ /_/ / /_/ / / / /
\___\_\__,_/_/_/_/   jobs
    "#
    );
}

/// Prints what this process is about to run.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    let mode = config.app.mode;
    info!("{}", separator);
    info!("Environment: {}", config.app.environment);
    info!("Run mode:    {}", mode);
    info!("Redis:       {}", redact_url(&config.redis.url));
    if mode.serves_api() {
        let addr = config.server.addr();
        info!("REST API:    http://{}/api/v1", addr);
        info!("Health:      http://{}/health", addr);
        if config.observability.metrics_enabled {
            info!("Metrics:     http://{}{}", addr, config.observability.metrics_path);
        }
    }
    if mode.runs_workers() {
        info!(
            "Workers:     {} (poll every {} ms)",
            config.worker.concurrency, config.worker.poll_interval_ms
        );
    }
    info!("{}", separator);
}

/// Hides the password part of a connection URL.
fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("****"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
