//! Job queue REST API controller.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use quill_jobs::{Batch, BatchRequest, BatchStatus, Job, JobId, NewJob, QueueDepths, QueueStats};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extractors::ApiJson;
use crate::responses::{created, not_found, ok, ApiResult, AppError};
use crate::state::AppState;

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(enqueue_job))
        .route("/jobs/batch", post(enqueue_batch))
        .route("/jobs/:job_id", get(get_job).delete(cancel_job))
        .route("/batches/:batch_id", get(get_batch_status))
        .route("/stats", get(queue_stats))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for an accepted job.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub id: JobId,
}

/// Counters plus the literal size of each set.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counters: QueueStats,
    pub depths: QueueDepths,
}

// ============================================================================
// Handlers
// ============================================================================

/// Admit one job.
async fn enqueue_job(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NewJob>,
) -> Result<(StatusCode, Json<EnqueueResponse>), AppError> {
    let id = state.queue.enqueue(request).await?;
    debug!(job_id = %id, "Job accepted");
    Ok(created(EnqueueResponse { id }))
}

/// Admit a batch of jobs.
async fn enqueue_batch(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BatchRequest>,
) -> Result<(StatusCode, Json<Batch>), AppError> {
    let batch = state.queue.enqueue_batch(request).await?;
    Ok(created(batch))
}

/// Get a job record.
async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Job> {
    let id = JobId::from_string(job_id);
    match state.queue.get_job_status(&id).await? {
        Some(job) => ok(job),
        None => Err(not_found("Job", id)),
    }
}

/// Cancel a pending job.
async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Job> {
    let job = state.queue.cancel(&JobId::from_string(job_id)).await?;
    ok(job)
}

/// Get the aggregated status of a batch.
async fn get_batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<BatchStatus> {
    match state.queue.batch_status(&batch_id).await? {
        Some(status) => ok(status),
        None => Err(not_found("Batch", batch_id)),
    }
}

/// Queue statistics.
async fn queue_stats(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    let counters = state.queue.get_queue_stats().await?;
    let depths = state.queue.queue_depths().await?;
    ok(StatsResponse { counters, depths })
}
