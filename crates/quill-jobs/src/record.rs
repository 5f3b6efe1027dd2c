//! Job record persistence.

use crate::error::JobResult;
use crate::job::Job;
use crate::keys::QueueKeys;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// JSON job records under `{prefix}:job:{id}`.
///
/// Every write resets the record's TTL. A record that expired reads as
/// `None`, the same as one that never existed.
#[derive(Clone)]
pub struct JobRecords {
    store: Arc<dyn Store>,
    keys: QueueKeys,
    ttl: Duration,
}

impl JobRecords {
    pub fn new(store: Arc<dyn Store>, keys: QueueKeys, ttl: Duration) -> Self {
        Self { store, keys, ttl }
    }

    /// Record lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Loads a job record.
    ///
    /// A record that no longer parses is logged and treated as missing.
    pub async fn load(&self, job_id: &str) -> JobResult<Option<Job>> {
        let Some(json) = self.store.get(&self.keys.job(job_id)).await? else {
            return Ok(None);
        };

        match Job::from_json(&json) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                warn!(job_id, error = %e, "Discarding unreadable job record");
                Ok(None)
            }
        }
    }

    /// Writes a job record.
    pub async fn save(&self, job: &Job) -> JobResult<()> {
        self.store
            .set_with_ttl(&self.keys.job(job.id.as_str()), &job.to_json()?, self.ttl)
            .await
    }
}
