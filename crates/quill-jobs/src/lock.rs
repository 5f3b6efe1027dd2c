//! Per-job leases.

use crate::error::JobResult;
use crate::keys::QueueKeys;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Lease manager: at most one worker holds a job's lock at a time.
///
/// The lock key holds the owner's worker ID and expires after the lease
/// TTL, so a crashed worker's jobs become claimable again without help.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn Store>,
    keys: QueueKeys,
    ttl: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn Store>, keys: QueueKeys, ttl: Duration) -> Self {
        Self { store, keys, ttl }
    }

    /// Lease duration.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Takes the lease if nobody holds it.
    pub async fn acquire(&self, job_id: &str, worker_id: &str) -> JobResult<bool> {
        let acquired = self
            .store
            .set_if_absent_with_ttl(&self.keys.lock(job_id), worker_id, self.ttl)
            .await?;
        debug!(job_id, worker_id, acquired, "Lock acquire");
        Ok(acquired)
    }

    /// Drops the lease if `worker_id` holds it.
    pub async fn release(&self, job_id: &str, worker_id: &str) -> JobResult<bool> {
        self.store
            .delete_if_equals(&self.keys.lock(job_id), worker_id)
            .await
    }

    /// Extends the lease by a full TTL if `worker_id` holds it.
    pub async fn refresh(&self, job_id: &str, worker_id: &str) -> JobResult<bool> {
        self.store
            .expire_if_equals(&self.keys.lock(job_id), worker_id, self.ttl)
            .await
    }

    /// Current holder, if the lease is live.
    pub async fn owner(&self, job_id: &str) -> JobResult<Option<String>> {
        self.store.get(&self.keys.lock(job_id)).await
    }

    /// Returns true if `worker_id` holds a live lease on the job.
    pub async fn is_owner(&self, job_id: &str, worker_id: &str) -> JobResult<bool> {
        Ok(self.owner(job_id).await?.as_deref() == Some(worker_id))
    }
}
