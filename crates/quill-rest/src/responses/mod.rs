//! API response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quill_core::{ErrorResponse, QuillError};
use quill_jobs::JobError;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Error body: `{ "error": { "code": ..., "message": ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorResponse,
}

/// Application error type for Axum.
#[derive(Debug)]
pub struct AppError(pub QuillError);

impl From<QuillError> for AppError {
    fn from(err: QuillError) -> Self {
        Self(err)
    }
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        }

        let body = Json(ErrorBody {
            error: ErrorResponse::from_error(&self.0),
        });
        (status, body).into_response()
    }
}

/// Result type for Axum handlers.
pub type ApiResult<T> = Result<Json<T>, AppError>;

/// Helper to create a success response.
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(data))
}

/// Helper to create a created (201) response.
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(data))
}

/// 404 for a resource the queue does not know.
pub fn not_found(resource_type: &'static str, id: impl ToString) -> AppError {
    AppError(QuillError::not_found(resource_type, id))
}
