//! Job error types.

use quill_core::QuillError;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Priority outside 1-10.
    #[error("Invalid priority: {0} (must be between 1 and 10)")]
    InvalidPriority(i64),

    /// Job request rejected at admission.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Payload cannot be used for this request.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Job or batch not found (or already expired).
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Operation not allowed in the job's current state.
    #[error("Invalid job state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Job changed state under a concurrent operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Caller does not hold the job's lease.
    #[error("Worker {worker_id} does not hold the lock for job {job_id}")]
    NotLockOwner { job_id: String, worker_id: String },

    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Any other store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job handler failed.
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl JobError {
    /// Not-found error for a job ID.
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Job",
            id: id.into(),
        }
    }

    /// Not-found error for a batch ID.
    pub fn batch_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Batch",
            id: id.into(),
        }
    }

    /// Text recorded on the job when a handler fails.
    ///
    /// Handler failures keep their own message; other errors use their
    /// display form.
    pub fn failure_message(&self) -> String {
        match self {
            JobError::ExecutionFailed(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Returns true if the request was rejected before anything was written.
    pub fn is_admission_error(&self) -> bool {
        matches!(
            self,
            JobError::InvalidPriority(_) | JobError::InvalidJob(_) | JobError::InvalidPayload(_)
        )
    }

    /// Returns true if the shared store could not be reached.
    pub fn is_store_error(&self) -> bool {
        matches!(self, JobError::Redis(_) | JobError::Pool(_) | JobError::Store(_))
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.is_store_error() || matches!(self, JobError::ExecutionFailed(_))
    }
}

impl From<JobError> for QuillError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::InvalidPriority(_) | JobError::InvalidJob(_) | JobError::InvalidPayload(_) => {
                QuillError::Validation(err.to_string())
            }
            JobError::NotFound { kind, id } => QuillError::NotFound {
                resource_type: kind,
                id,
            },
            JobError::InvalidState { .. } | JobError::NotLockOwner { .. } => {
                QuillError::Conflict(err.to_string())
            }
            JobError::Conflict(message) => QuillError::Conflict(message),
            JobError::Redis(_) | JobError::Pool(_) | JobError::Store(_) => {
                QuillError::StoreUnavailable(err.to_string())
            }
            JobError::ExecutionFailed(message) => QuillError::ExternalService {
                service: "job handler".to_string(),
                message,
            },
            JobError::Configuration(message) => QuillError::Configuration(message),
            JobError::Serialization(_) => QuillError::Internal(err.to_string()),
        }
    }
}
