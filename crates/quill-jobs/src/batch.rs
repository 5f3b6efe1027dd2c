//! Batches: many jobs admitted together and tracked as a group.
//!
//! A batch is a thin layer over single-job enqueue. Jobs are validated as a
//! whole before anything is written, but insertion is not atomic: a store
//! failure part way through leaves the jobs inserted so far in place.

use crate::error::{JobError, JobResult};
use crate::job::{JobId, JobStatus, NewJob};
use crate::queue::JobQueue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

/// Payload field that links a job to its batch.
pub const BATCH_ID_FIELD: &str = "batchId";

/// Request to admit several jobs at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub jobs: Vec<NewJob>,
}

/// Stored batch record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub job_ids: Vec<JobId>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated status of a batch's jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatus {
    pub id: String,
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Jobs whose record is gone.
    pub expired: u64,
}

impl BatchStatus {
    /// Returns true once no job of the batch can change any more.
    pub fn is_finished(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

fn batch_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("batch_{}_{}", Utc::now().timestamp_millis(), &suffix[..9])
}

/// Adds `batchId` to a job payload. A missing payload becomes an object.
fn tag_payload(payload: Value, batch_id: &str, index: usize) -> JobResult<Value> {
    let mut object = match payload {
        Value::Object(object) => object,
        Value::Null => Map::new(),
        other => {
            return Err(JobError::InvalidPayload(format!(
                "job {} in batch: payload must be a JSON object, got {}",
                index,
                json_kind(&other)
            )))
        }
    };
    object.insert(BATCH_ID_FIELD.to_string(), Value::String(batch_id.to_string()));
    Ok(Value::Object(object))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl JobQueue {
    /// Admit every job of a batch.
    ///
    /// Any invalid job rejects the whole batch before anything is written.
    pub async fn enqueue_batch(&self, request: BatchRequest) -> JobResult<Batch> {
        if request.jobs.is_empty() {
            return Err(JobError::InvalidJob("batch contains no jobs".to_string()));
        }

        let id = batch_id();
        let jobs = request
            .jobs
            .into_iter()
            .enumerate()
            .map(|(index, new_job)| {
                let mut job = self.admit(new_job)?;
                job.payload = tag_payload(std::mem::take(&mut job.payload), &id, index)?;
                Ok(job)
            })
            .collect::<JobResult<Vec<_>>>()?;

        for job in &jobs {
            self.insert(job).await?;
        }

        let batch = Batch {
            id,
            job_ids: jobs.into_iter().map(|job| job.id).collect(),
            created_at: Utc::now(),
        };
        self.store()
            .set_with_ttl(
                &self.keys().batch(&batch.id),
                &serde_json::to_string(&batch)?,
                self.records().ttl(),
            )
            .await?;

        info!(batch_id = %batch.id, jobs = batch.job_ids.len(), "Enqueued batch");
        Ok(batch)
    }

    /// Stored batch record.
    pub async fn get_batch(&self, batch_id: &str) -> JobResult<Option<Batch>> {
        let Some(json) = self.store().get(&self.keys().batch(batch_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Status of every job in a batch, counted by state.
    pub async fn batch_status(&self, batch_id: &str) -> JobResult<Option<BatchStatus>> {
        let Some(batch) = self.get_batch(batch_id).await? else {
            return Ok(None);
        };

        let mut status = BatchStatus {
            id: batch.id,
            total: batch.job_ids.len() as u64,
            ..BatchStatus::default()
        };
        for job_id in &batch.job_ids {
            match self.get_job_status(job_id).await? {
                Some(job) => match job.status {
                    JobStatus::Pending => status.pending += 1,
                    JobStatus::Processing => status.processing += 1,
                    JobStatus::Completed => status.completed += 1,
                    JobStatus::Failed => status.failed += 1,
                    JobStatus::Cancelled => status.cancelled += 1,
                },
                None => status.expired += 1,
            }
        }

        Ok(Some(status))
    }
}
