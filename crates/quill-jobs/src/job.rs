//! Job record and admission request types.

use crate::error::{JobError, JobResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique job identifier: `{type}_{unix-millis}_{suffix}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new ID for a job of the given type.
    pub fn generate(job_type: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}_{}_{}",
            job_type,
            Utc::now().timestamp_millis(),
            &suffix[..9]
        ))
    }

    /// Creates a job ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job priority, 1 (lowest) to 10 (highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Priority(u8);

impl Priority {
    /// Lowest priority level.
    pub const MIN: Priority = Priority(1);
    /// Highest priority level.
    pub const MAX: Priority = Priority(10);
    /// Priority given to jobs that do not specify one.
    pub const DEFAULT: Priority = Priority(5);

    /// Validates a priority value.
    pub fn new(value: i64) -> JobResult<Self> {
        if (1..=10).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(JobError::InvalidPriority(value))
        }
    }

    /// Clamps any value into the valid range.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(1, 10) as u8)
    }

    /// Returns the numeric level.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Priority after one retry: `step` levels lower, never below 1.
    pub fn decayed(self, step: u8) -> Self {
        Self(self.0.saturating_sub(step).max(Self::MIN.0))
    }

    /// All levels, highest first (the claim scan order).
    pub fn descending() -> impl Iterator<Item = Priority> {
        (1..=10u8).rev().map(Priority)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i64> for Priority {
    type Error = JobError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in a priority queue (possibly delayed after a failure).
    #[default]
    Pending,
    /// Claimed by a worker holding the lease.
    Processing,
    /// Handler succeeded.
    Completed,
    /// Retries exhausted.
    Failed,
    /// Cancelled before it was claimed.
    Cancelled,
}

impl JobStatus {
    /// Returns true for states a job never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A job record as stored under `{prefix}:job:{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,

    /// Collaborator tag, e.g. `generate_content`.
    #[serde(rename = "type")]
    pub job_type: String,

    pub status: JobStatus,

    /// Opaque to the queue.
    pub payload: Value,

    pub priority: Priority,

    pub max_retries: u32,

    pub current_retry: u32,

    pub created_at: DateTime<Utc>,

    /// Set on the first claim only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set when the job reaches a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Message of the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Worker that holds or last held the lease.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

impl Job {
    /// Creates a pending job.
    pub fn new(job_type: impl Into<String>, payload: Value, priority: Priority, max_retries: u32) -> Self {
        let job_type = job_type.into();
        Self {
            id: JobId::generate(&job_type),
            job_type,
            status: JobStatus::Pending,
            payload,
            priority,
            max_retries,
            current_retry: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
            worker_id: None,
        }
    }

    /// Returns true if the next failure will be retried.
    pub fn has_retries_left(&self) -> bool {
        self.current_retry < self.max_retries
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> JobResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> JobResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Admission request for one job.
///
/// `priority` stays a raw integer so out-of-range values surface as
/// [`JobError::InvalidPriority`] instead of a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    #[serde(rename = "type")]
    pub job_type: String,

    #[serde(default)]
    pub payload: Value,

    #[serde(default)]
    pub priority: Option<i64>,

    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl NewJob {
    /// Creates a request with default priority and retry budget.
    pub fn new(job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            priority: None,
            max_retries: None,
        }
    }

    /// Set the priority.
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the retry budget.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}
