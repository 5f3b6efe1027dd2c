//! The job queue.
//!
//! State lives entirely in the [`Store`]:
//!
//! ```text
//! {p}:job:{id}          JSON record (TTL)
//! {p}:queue:{1..10}     sorted set of pending ids, score = eligible-at (µs)
//! {p}:processing        sorted set of claimed ids, score = claimed-at (µs)
//! {p}:lock:{id}         owning worker id (lease TTL)
//! {p}:stats             counters hash
//! ```
//!
//! A pending or processing job is in exactly one of the sorted sets. Removing
//! an id from its priority set is what decides a claim (or a cancel): of two
//! racing callers, only the one whose remove succeeds proceeds.

use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId, JobStatus, NewJob, Priority};
use crate::keys::QueueKeys;
use crate::lock::LockManager;
use crate::metrics::JobMetrics;
use crate::record::JobRecords;
use crate::retry::{FailOutcome, RetryPolicy};
use crate::stats::{Counter, QueueDepths, QueueStats, StatsCounters};
use crate::store::Store;
use chrono::{DateTime, Utc};
use quill_config::QueueConfig;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Queue behaviour settings.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub key_prefix: String,
    pub default_priority: Priority,
    pub default_max_retries: u32,
    pub max_retries_limit: u32,
    pub max_concurrent_jobs: u64,
    pub lock_ttl: Duration,
    pub job_ttl: Duration,
    pub retry: RetryPolicy,
    pub claim_attempts: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for QueueSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            key_prefix: config.key_prefix.clone(),
            default_priority: Priority::clamped(i64::from(config.default_priority)),
            default_max_retries: config.default_max_retries,
            max_retries_limit: config.max_retries_limit,
            max_concurrent_jobs: config.max_concurrent_jobs,
            lock_ttl: config.lock_ttl(),
            job_ttl: config.job_ttl(),
            retry: RetryPolicy::new(config.retry_delay(), config.retry_priority_step),
            claim_attempts: config.claim_attempts.max(1),
        }
    }
}

static LAST_SCORE: AtomicU64 = AtomicU64::new(0);

fn micros(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp_micros()).unwrap_or(0)
}

/// Score for a job becoming eligible now.
///
/// Strictly increasing within the process, so jobs enqueued in the same
/// microsecond keep their submission order.
fn next_score() -> f64 {
    let now = micros(Utc::now());
    let prev = LAST_SCORE
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(prev + 1) as f64
}

/// Highest score that is eligible for a claim right now.
fn eligible_score() -> f64 {
    micros(Utc::now()).max(LAST_SCORE.load(Ordering::SeqCst)) as f64
}

enum Claim {
    Claimed(Job),
    /// Someone else removed the id first.
    Lost,
    /// Record expired or already terminal.
    Skipped,
    /// Processing set filled up concurrently.
    AtCapacity,
}

/// Distributed priority job queue.
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn Store>,
    keys: QueueKeys,
    settings: QueueSettings,
    records: JobRecords,
    locks: LockManager,
    stats: StatsCounters,
}

impl JobQueue {
    /// Create a queue over a store.
    pub fn new(store: Arc<dyn Store>, settings: QueueSettings) -> Self {
        let keys = QueueKeys::new(&settings.key_prefix);
        Self {
            records: JobRecords::new(store.clone(), keys.clone(), settings.job_ttl),
            locks: LockManager::new(store.clone(), keys.clone(), settings.lock_ttl),
            stats: StatsCounters::new(store.clone(), &keys),
            store,
            keys,
            settings,
        }
    }

    /// Create a queue from the `[queue]` configuration section.
    pub fn from_config(store: Arc<dyn Store>, config: &QueueConfig) -> Self {
        Self::new(store, QueueSettings::from(config))
    }

    /// Queue settings.
    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Key layout.
    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    /// Lease manager.
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn records(&self) -> &JobRecords {
        &self.records
    }

    /// Validates a request and builds the pending record, writing nothing.
    pub(crate) fn admit(&self, request: NewJob) -> JobResult<Job> {
        let job_type = request.job_type.trim();
        if job_type.is_empty() {
            return Err(JobError::InvalidJob("job type cannot be empty".to_string()));
        }

        let priority = match request.priority {
            Some(value) => Priority::new(value)?,
            None => self.settings.default_priority,
        };

        let max_retries = request
            .max_retries
            .unwrap_or(self.settings.default_max_retries);
        if max_retries > self.settings.max_retries_limit {
            return Err(JobError::InvalidJob(format!(
                "maxRetries {} exceeds the limit of {}",
                max_retries, self.settings.max_retries_limit
            )));
        }

        Ok(Job::new(job_type, request.payload, priority, max_retries))
    }

    /// Writes an admitted job and makes it claimable.
    pub(crate) async fn insert(&self, job: &Job) -> JobResult<()> {
        self.records.save(job).await?;
        self.store
            .sorted_set_add(&self.keys.queue(job.priority), job.id.as_str(), next_score())
            .await?;
        self.stats
            .apply(&[(Counter::Pending, 1), (Counter::Total, 1)])
            .await?;

        JobMetrics::job_enqueued(&job.job_type, job.priority.get());
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = %job.priority,
            "Enqueued job"
        );
        Ok(())
    }

    /// Admit a job. Nothing is written if validation fails.
    pub async fn enqueue(&self, request: NewJob) -> JobResult<JobId> {
        let job = self.admit(request)?;
        self.insert(&job).await?;
        Ok(job.id)
    }

    /// Claim the oldest eligible job of the highest non-empty priority.
    ///
    /// Returns `None` when nothing is eligible or the processing set is at
    /// `max_concurrent_jobs`. Losing a race to another worker is not an
    /// error; the scan just moves on. Ids whose lease is held are skipped
    /// in favour of the next member of the same level, up to
    /// `claim_attempts` per level.
    pub async fn dequeue(&self, worker_id: &str) -> JobResult<Option<Job>> {
        let processing = self
            .store
            .sorted_set_cardinality(&self.keys.processing())
            .await?;
        if processing >= self.settings.max_concurrent_jobs {
            debug!(
                worker_id,
                processing,
                cap = self.settings.max_concurrent_jobs,
                "Concurrency cap reached"
            );
            return Ok(None);
        }

        for priority in Priority::descending() {
            let queue_key = self.keys.queue(priority);
            let mut passed: HashSet<String> = HashSet::new();

            while passed.len() < self.settings.claim_attempts as usize {
                // One more member than we have passed over is enough to
                // reach the first one not yet tried.
                let candidate = self
                    .store
                    .sorted_set_range_by_score(
                        &queue_key,
                        f64::NEG_INFINITY,
                        eligible_score(),
                        Some(passed.len() + 1),
                    )
                    .await?
                    .into_iter()
                    .find(|(id, _)| !passed.contains(id));
                let Some((job_id, score)) = candidate else {
                    break;
                };

                if !self.locks.acquire(&job_id, worker_id).await? {
                    debug!(job_id = %job_id, worker_id, "Candidate is leased, trying the next one");
                    passed.insert(job_id);
                    continue;
                }

                match self.claim_locked(&job_id, priority, score, worker_id).await? {
                    Claim::Claimed(job) => return Ok(Some(job)),
                    Claim::AtCapacity => return Ok(None),
                    Claim::Lost | Claim::Skipped => {
                        passed.insert(job_id);
                    }
                }
            }
        }

        Ok(None)
    }

    /// Steps of a claim after the lease was taken.
    async fn claim_locked(
        &self,
        job_id: &str,
        priority: Priority,
        score: f64,
        worker_id: &str,
    ) -> JobResult<Claim> {
        let queue_key = self.keys.queue(priority);
        let processing_key = self.keys.processing();

        if !self.store.sorted_set_remove(&queue_key, job_id).await? {
            self.locks.release(job_id, worker_id).await?;
            debug!(job_id, worker_id, "Claim lost to another caller");
            return Ok(Claim::Lost);
        }

        let added = self
            .store
            .sorted_set_add_bounded(
                &processing_key,
                job_id,
                micros(Utc::now()) as f64,
                self.settings.max_concurrent_jobs,
            )
            .await;
        match added {
            Ok(true) => {}
            Ok(false) => {
                self.store.sorted_set_add(&queue_key, job_id, score).await?;
                self.locks.release(job_id, worker_id).await?;
                debug!(job_id, worker_id, "Concurrency cap reached during claim");
                return Ok(Claim::AtCapacity);
            }
            Err(e) => {
                // Put the id back so the job is not stranded outside every set.
                let _ = self.store.sorted_set_add(&queue_key, job_id, score).await;
                let _ = self.locks.release(job_id, worker_id).await;
                return Err(e);
            }
        }

        let loaded = self.records.load(job_id).await;
        let mut job = match loaded {
            Ok(Some(job)) if !job.status.is_terminal() => job,
            Err(e) => {
                self.rollback_claim(job_id, &queue_key, score, worker_id).await;
                return Err(e);
            }
            Ok(stale) => {
                self.store.sorted_set_remove(&processing_key, job_id).await?;
                self.locks.release(job_id, worker_id).await?;
                warn!(
                    job_id,
                    worker_id,
                    expired = stale.is_none(),
                    "Dropped queued id without a claimable record"
                );
                return Ok(Claim::Skipped);
            }
        };

        let now = Utc::now();
        job.status = JobStatus::Processing;
        job.started_at.get_or_insert(now);
        job.worker_id = Some(worker_id.to_string());
        if let Err(e) = self.records.save(&job).await {
            self.rollback_claim(job_id, &queue_key, score, worker_id).await;
            return Err(e);
        }
        self.stats
            .apply(&[(Counter::Pending, -1), (Counter::Processing, 1)])
            .await?;

        JobMetrics::job_claimed(
            &job.job_type,
            job.priority.get(),
            (now - job.created_at).to_std().unwrap_or_default(),
        );
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = %job.priority,
            attempt = job.current_retry,
            worker_id,
            "Claimed job"
        );

        Ok(Claim::Claimed(job))
    }

    /// Undoes a claim that failed after the id entered the processing set.
    ///
    /// Best effort: if the store is still failing, the id stays in the
    /// processing set and `recover_stale` returns it once the lease expires.
    async fn rollback_claim(&self, job_id: &str, queue_key: &str, score: f64, worker_id: &str) {
        let restored = async {
            self.store.sorted_set_add(queue_key, job_id, score).await?;
            self.store
                .sorted_set_remove(&self.keys.processing(), job_id)
                .await?;
            self.locks.release(job_id, worker_id).await
        }
        .await;
        match restored {
            Ok(_) => debug!(job_id, worker_id, "Rolled back interrupted claim"),
            Err(e) => warn!(
                job_id,
                worker_id,
                error = %e,
                "Could not roll back interrupted claim; recovery will requeue it"
            ),
        }
    }

    async fn ensure_owner(&self, job_id: &JobId, worker_id: &str) -> JobResult<()> {
        if self.locks.is_owner(job_id.as_str(), worker_id).await? {
            Ok(())
        } else {
            Err(JobError::NotLockOwner {
                job_id: job_id.to_string(),
                worker_id: worker_id.to_string(),
            })
        }
    }

    async fn load_processing(&self, job_id: &JobId) -> JobResult<Job> {
        let job = self
            .records
            .load(job_id.as_str())
            .await?
            .ok_or_else(|| JobError::job_not_found(job_id.as_str()))?;
        if job.status != JobStatus::Processing {
            return Err(JobError::InvalidState {
                expected: JobStatus::Processing.to_string(),
                actual: job.status.to_string(),
            });
        }
        Ok(job)
    }

    /// Mark a claimed job completed. The caller must hold its lease.
    pub async fn complete(
        &self,
        job_id: &JobId,
        worker_id: &str,
        result: Option<Value>,
    ) -> JobResult<Job> {
        self.ensure_owner(job_id, worker_id).await?;
        let mut job = self.load_processing(job_id).await?;

        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.result = result;
        self.records.save(&job).await?;

        self.store
            .sorted_set_remove(&self.keys.processing(), job_id.as_str())
            .await?;
        self.locks.release(job_id.as_str(), worker_id).await?;
        self.stats
            .apply(&[(Counter::Processing, -1), (Counter::Completed, 1)])
            .await?;

        JobMetrics::job_completed(&job.job_type);
        info!(job_id = %job_id, job_type = %job.job_type, worker_id, "Job completed");
        Ok(job)
    }

    /// Record a handler failure. The caller must hold the job's lease.
    ///
    /// With retries left, the job goes back to `pending` at a decayed
    /// priority and becomes claimable after the retry delay. Otherwise it
    /// ends as `failed`.
    pub async fn fail(&self, job_id: &JobId, worker_id: &str, message: &str) -> JobResult<FailOutcome> {
        self.ensure_owner(job_id, worker_id).await?;
        let mut job = self.load_processing(job_id).await?;

        let now = Utc::now();
        let outcome = self.settings.retry.decide(&job, now);
        job.error = Some(message.to_string());

        match outcome {
            FailOutcome::Retried {
                priority,
                retry_at,
                attempt,
            } => {
                // Queued before the record reads pending: if the save fails,
                // the record still says processing and recovery requeues it.
                // The lease we hold keeps other workers off it until release.
                let retry_key = self.keys.queue(priority);
                self.store
                    .sorted_set_add(&retry_key, job_id.as_str(), micros(retry_at) as f64)
                    .await?;

                job.status = JobStatus::Pending;
                job.priority = priority;
                job.current_retry = attempt;
                if let Err(e) = self.records.save(&job).await {
                    let _ = self.store.sorted_set_remove(&retry_key, job_id.as_str()).await;
                    return Err(e);
                }

                self.store
                    .sorted_set_remove(&self.keys.processing(), job_id.as_str())
                    .await?;
                self.locks.release(job_id.as_str(), worker_id).await?;
                self.stats
                    .apply(&[(Counter::Processing, -1), (Counter::Pending, 1)])
                    .await?;

                JobMetrics::job_retried(&job.job_type, attempt);
                warn!(
                    job_id = %job_id,
                    worker_id,
                    attempt,
                    max_retries = job.max_retries,
                    priority = %priority,
                    retry_at = %retry_at,
                    error = message,
                    "Job failed, scheduled for retry"
                );
            }
            FailOutcome::Exhausted => {
                job.status = JobStatus::Failed;
                job.completed_at = Some(now);
                self.records.save(&job).await?;

                self.store
                    .sorted_set_remove(&self.keys.processing(), job_id.as_str())
                    .await?;
                self.locks.release(job_id.as_str(), worker_id).await?;
                self.stats
                    .apply(&[(Counter::Processing, -1), (Counter::Failed, 1)])
                    .await?;

                JobMetrics::job_failed(&job.job_type);
                error!(
                    job_id = %job_id,
                    worker_id,
                    retries = job.current_retry,
                    error = message,
                    "Job failed permanently"
                );
            }
        }

        Ok(outcome)
    }

    /// Cancel a job that has not been claimed yet.
    pub async fn cancel(&self, job_id: &JobId) -> JobResult<Job> {
        let mut job = self
            .records
            .load(job_id.as_str())
            .await?
            .ok_or_else(|| JobError::job_not_found(job_id.as_str()))?;

        let expected_pending = |actual: JobStatus| JobError::InvalidState {
            expected: JobStatus::Pending.to_string(),
            actual: actual.to_string(),
        };

        if job.status != JobStatus::Pending {
            return Err(expected_pending(job.status));
        }

        if !self
            .store
            .sorted_set_remove(&self.keys.queue(job.priority), job_id.as_str())
            .await?
        {
            // Claimed or re-queued between the read and the remove.
            let actual = self
                .records
                .load(job_id.as_str())
                .await?
                .map_or(JobStatus::Processing, |current| current.status);
            if actual == JobStatus::Pending {
                return Err(JobError::Conflict(format!(
                    "job {} is being claimed or re-queued; retry the cancel",
                    job_id
                )));
            }
            return Err(expected_pending(actual));
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        self.records.save(&job).await?;
        self.stats
            .apply(&[(Counter::Pending, -1), (Counter::Cancelled, 1)])
            .await?;

        JobMetrics::job_cancelled(&job.job_type);
        info!(job_id = %job_id, job_type = %job.job_type, "Job cancelled");
        Ok(job)
    }

    /// Current record of a job. Expired jobs read as `None`.
    pub async fn get_job_status(&self, job_id: &JobId) -> JobResult<Option<Job>> {
        self.records.load(job_id.as_str()).await
    }

    /// Counter snapshot.
    pub async fn get_queue_stats(&self) -> JobResult<QueueStats> {
        self.stats.snapshot().await
    }

    /// Sizes of every priority set and of the processing set.
    pub async fn queue_depths(&self) -> JobResult<QueueDepths> {
        let mut levels = BTreeMap::new();
        for priority in Priority::descending() {
            let depth = self
                .store
                .sorted_set_cardinality(&self.keys.queue(priority))
                .await?;
            levels.insert(priority.get(), depth);
        }
        let processing = self
            .store
            .sorted_set_cardinality(&self.keys.processing())
            .await?;

        let pending: Vec<(u8, u64)> = levels.iter().map(|(p, d)| (*p, *d)).collect();
        JobMetrics::update_queue_depths(&pending, processing);

        Ok(QueueDepths { levels, processing })
    }

    /// Extend the caller's lease on a claimed job.
    pub async fn refresh_lease(&self, job_id: &JobId, worker_id: &str) -> JobResult<bool> {
        self.locks.refresh(job_id.as_str(), worker_id).await
    }

    /// Return claims whose lease expired to their priority queue.
    ///
    /// The job keeps its retry count and priority and goes to the back of
    /// its level. Any non-terminal record counts, including a `pending` one
    /// left by a claim or retry the store interrupted. Ids whose record
    /// expired or is terminal are dropped. Returns the number of jobs put
    /// back.
    pub async fn recover_stale(&self) -> JobResult<u64> {
        let processing_key = self.keys.processing();
        let claimed = self
            .store
            .sorted_set_range_by_score(&processing_key, f64::NEG_INFINITY, f64::INFINITY, None)
            .await?;

        let sweeper = format!("recovery-{}", Uuid::new_v4());
        let mut recovered = 0u64;

        for (job_id, _) in claimed {
            if self.locks.owner(&job_id).await?.is_some() {
                continue;
            }
            // Hold the lease while moving the job so concurrent sweeps and
            // claims cannot interleave with us.
            if !self.locks.acquire(&job_id, &sweeper).await? {
                continue;
            }

            let moved = self.requeue_stale(&job_id, &processing_key).await;
            self.locks.release(&job_id, &sweeper).await?;
            if moved? {
                recovered += 1;
            }
        }

        if recovered > 0 {
            JobMetrics::jobs_recovered(recovered);
            info!(count = recovered, "Recovered stale jobs");
        }

        Ok(recovered)
    }

    async fn requeue_stale(&self, job_id: &str, processing_key: &str) -> JobResult<bool> {
        let mut job = match self.records.load(job_id).await? {
            Some(job) if !job.status.is_terminal() => job,
            other => {
                self.store.sorted_set_remove(processing_key, job_id).await?;
                debug!(job_id, expired = other.is_none(), "Dropped stale processing entry");
                return Ok(false);
            }
        };

        // A pending record here never had its counters moved to processing.
        let was_processing = job.status == JobStatus::Processing;
        // An interrupted retry may have queued the id at another level.
        for priority in Priority::descending().filter(|p| *p != job.priority) {
            self.store
                .sorted_set_remove(&self.keys.queue(priority), job_id)
                .await?;
        }
        self.store
            .sorted_set_add(&self.keys.queue(job.priority), job_id, next_score())
            .await?;
        if was_processing {
            job.status = JobStatus::Pending;
            self.records.save(&job).await?;
        }
        self.store.sorted_set_remove(processing_key, job_id).await?;
        if was_processing {
            self.stats
                .apply(&[(Counter::Processing, -1), (Counter::Pending, 1)])
                .await?;
        }

        warn!(
            job_id,
            worker_id = job.worker_id.as_deref().unwrap_or("unknown"),
            priority = %job.priority,
            "Recovered job from expired lease"
        );
        Ok(true)
    }

    /// Check that the store answers.
    pub async fn health_check(&self) -> JobResult<()> {
        self.store.ping().await
    }
}
