//! Application state for Axum handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use quill_jobs::JobQueue;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub queue: JobQueue,
    /// Renders `/metrics`. `None` when metrics are disabled.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(queue: JobQueue) -> Self {
        Self {
            queue,
            metrics: None,
        }
    }

    /// Attaches the Prometheus recorder handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
