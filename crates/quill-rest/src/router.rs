//! Main application router.

use crate::{
    controllers::{health_controller, jobs_controller},
    middleware::logging_middleware,
    state::AppState,
};
use axum::{http::HeaderValue, middleware, routing::get, Router};
use quill_config::ServerConfig;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Creates the main application router.
///
/// Prometheus text is served at `metrics_path` when the state carries a
/// recorder handle.
pub fn create_router(state: AppState, server_config: &ServerConfig, metrics_path: &str) -> Router {
    let cors = create_cors_layer(server_config);

    let api_router = jobs_controller::router();

    let router = Router::new()
        .merge(health_controller::router(metrics_path))
        .nest("/api/v1", api_router)
        .route("/", get(root))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(server_config.request_timeout()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(logging_middleware));

    info!("Router created with job endpoints at /api/v1");
    router
}

/// Creates a CORS layer based on server configuration.
fn create_cors_layer(server_config: &ServerConfig) -> CorsLayer {
    if !server_config.cors_enabled {
        return CorsLayer::new();
    }
    if server_config.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = server_config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Root endpoint handler.
async fn root() -> &'static str {
    "Quill Jobs API v1"
}
