//! Health and metrics endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status.
    pub status: String,
    /// Application version.
    pub version: String,
    /// Whether the store answered a ping.
    pub store: bool,
}

/// Creates the health router.
pub fn router(metrics_path: &str) -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route(metrics_path, get(metrics))
}

/// Health check endpoint. 503 while the store is unreachable.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.queue.health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Health check failed");
            false
        }
    };

    let (status, label) = if store {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store,
        }),
    )
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let Some(handle) = state.metrics.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // Depth gauges are sampled on scrape.
    if let Err(e) = state.queue.queue_depths().await {
        warn!(error = %e, "Failed to sample queue depths");
    }

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}
