//! Worker loops.

use crate::error::{JobError, JobResult};
use crate::handler::JobHandler;
use crate::job::Job;
use crate::metrics::{JobMetrics, WorkerMetrics};
use crate::queue::JobQueue;
use parking_lot::Mutex;
use quill_config::WorkerConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Worker loop timing.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Number of loops a pool runs.
    pub concurrency: usize,
    /// Sleep after an empty or failed poll.
    pub poll_interval: Duration,
    /// Lease refresh interval while a handler runs.
    pub heartbeat_interval: Duration,
    /// Interval between stale-claim sweeps.
    pub recovery_interval: Duration,
    /// Grace period for an in-flight handler after stop.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            poll_interval: config.poll_interval(),
            heartbeat_interval: config.heartbeat_interval(),
            recovery_interval: config.recovery_interval(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// How a job's processing ended for the loop.
enum Flow {
    Continue,
    Stop,
}

/// One polling loop bound to a worker ID.
///
/// Claims a job, runs the handler while refreshing the lease, then reports
/// the outcome through `complete` or `fail`. Store errors are logged and the
/// loop carries on after `poll_interval`.
pub struct Worker {
    id: String,
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    settings: WorkerSettings,
    shutdown_tx: broadcast::Sender<()>,
    stopping: AtomicBool,
    running: AtomicBool,
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl Worker {
    /// Create a worker.
    pub fn new(
        id: impl Into<String>,
        queue: JobQueue,
        handler: Arc<dyn JobHandler>,
        settings: WorkerSettings,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            id: id.into(),
            queue,
            handler,
            settings,
            shutdown_tx,
            stopping: AtomicBool::new(false),
            running: AtomicBool::new(false),
            jobs_processed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    /// Worker ID used as lease owner.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Check if the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Jobs this worker completed.
    pub fn jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    /// Handler failures this worker reported.
    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Stop claiming new jobs.
    ///
    /// An in-flight handler gets `shutdown_timeout` to finish. If it does
    /// not, the loop exits without releasing the lease, which then expires.
    pub fn stop(&self) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            info!(worker_id = %self.id, "Stopping worker...");
        }
        let _ = self.shutdown_tx.send(());
    }

    /// Run the loop until [`Worker::stop`] is called.
    pub async fn run(&self) -> JobResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::Configuration(format!(
                "worker {} is already running",
                self.id
            )));
        }
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut next_recovery = Instant::now();

        info!(
            worker_id = %self.id,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Worker started"
        );

        while !self.stopping.load(Ordering::SeqCst) {
            if Instant::now() >= next_recovery {
                self.recover().await;
                next_recovery = Instant::now() + self.settings.recovery_interval;
            }

            match self.queue.dequeue(&self.id).await {
                Ok(Some(job)) => {
                    let span = tracing::info_span!("job", job_id = %job.id, job_type = %job.job_type);
                    let flow = self.process(job, &mut shutdown_rx).instrument(span).await;
                    if matches!(flow, Flow::Stop) {
                        break;
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to dequeue job");
                }
            }

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(
            worker_id = %self.id,
            processed = self.jobs_processed(),
            failed = self.jobs_failed(),
            "Worker stopped"
        );
        Ok(())
    }

    async fn recover(&self) {
        match self.queue.recover_stale().await {
            Ok(0) => {}
            Ok(count) => debug!(worker_id = %self.id, count, "Recovery sweep returned jobs"),
            Err(e) => error!(worker_id = %self.id, error = %e, "Recovery sweep failed"),
        }
    }

    async fn heartbeat(&self, job: &Job) {
        match self.queue.refresh_lease(&job.id, &self.id).await {
            Ok(true) => debug!(job_id = %job.id, worker_id = %self.id, "Lease refreshed"),
            Ok(false) => warn!(
                job_id = %job.id,
                worker_id = %self.id,
                "Lease lost while handler is running"
            ),
            Err(e) => error!(job_id = %job.id, worker_id = %self.id, error = %e, "Lease refresh failed"),
        }
    }

    async fn process(&self, job: Job, shutdown_rx: &mut broadcast::Receiver<()>) -> Flow {
        debug!(worker_id = %self.id, attempt = job.current_retry, "Processing job");

        let started = Instant::now();
        let handle = self.handler.handle(&job);
        tokio::pin!(handle);

        let period = self.settings.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut deadline: Option<Instant> = None;
        let result = loop {
            let grace = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                result = &mut handle => break Some(result),
                _ = heartbeat.tick() => self.heartbeat(&job).await,
                _ = shutdown_rx.recv(), if deadline.is_none() => {
                    info!(
                        worker_id = %self.id,
                        grace_secs = self.settings.shutdown_timeout.as_secs(),
                        "Shutdown requested, waiting for in-flight job"
                    );
                    deadline = Some(Instant::now() + self.settings.shutdown_timeout);
                }
                _ = grace => break None,
            }
        };

        let Some(result) = result else {
            warn!(
                worker_id = %self.id,
                "Abandoning in-flight job at shutdown; its lease will expire"
            );
            return Flow::Stop;
        };

        let elapsed = started.elapsed();
        match result {
            Ok(value) => {
                JobMetrics::handler_duration(&job.job_type, "completed", elapsed);
                match self.queue.complete(&job.id, &self.id, value).await {
                    Ok(_) => {
                        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        error!(worker_id = %self.id, error = %e, "Failed to mark job as complete");
                    }
                }
            }
            Err(handler_error) => {
                JobMetrics::handler_duration(&job.job_type, "failed", elapsed);
                self.jobs_failed.fetch_add(1, Ordering::Relaxed);
                let message = handler_error.failure_message();
                match self.queue.fail(&job.id, &self.id, &message).await {
                    Ok(_) => {}
                    Err(e) => {
                        error!(worker_id = %self.id, error = %e, "Failed to mark job as failed");
                    }
                }
            }
        }

        if deadline.is_some() {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }
}

/// Worker pool statistics.
#[derive(Debug, Clone)]
pub struct WorkerPoolStats {
    pub id: String,
    pub running: usize,
    pub concurrency: usize,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
}

/// A set of worker loops in one process, started and stopped together.
pub struct WorkerPool {
    id: String,
    workers: Vec<Arc<Worker>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create `settings.concurrency` workers with IDs `{pool_id}-{n}`.
    pub fn new(
        pool_id: impl Into<String>,
        queue: JobQueue,
        handler: Arc<dyn JobHandler>,
        settings: WorkerSettings,
    ) -> Self {
        let id = pool_id.into();
        let workers = (1..=settings.concurrency)
            .map(|n| {
                Arc::new(Worker::new(
                    format!("{}-{}", id, n),
                    queue.clone(),
                    handler.clone(),
                    settings.clone(),
                ))
            })
            .collect();

        Self {
            id,
            workers,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// A pool ID unique to this process.
    pub fn generate_id() -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("worker-{}", &suffix[..8])
    }

    /// Get the pool ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Workers of this pool.
    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Spawn every worker loop onto the runtime.
    pub fn start(&self) {
        info!(pool_id = %self.id, concurrency = self.workers.len(), "Starting worker pool");

        let mut handles = self.handles.lock();
        for worker in &self.workers {
            let worker = worker.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = worker.run().await {
                    error!(worker_id = %worker.id(), error = %e, "Worker exited with error");
                }
            }));
        }
        WorkerMetrics::update_workers(&self.id, self.workers.len());
    }

    /// Signal every worker to stop.
    pub fn stop(&self) {
        info!(pool_id = %self.id, "Stopping worker pool...");
        for worker in &self.workers {
            worker.stop();
        }
    }

    /// Stop every worker and wait for the loops to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(pool_id = %self.id, error = %e, "Worker task panicked");
            }
        }
        WorkerMetrics::update_workers(&self.id, 0);
        info!(pool_id = %self.id, "Worker pool stopped");
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            id: self.id.clone(),
            running: self.workers.iter().filter(|w| w.is_running()).count(),
            concurrency: self.workers.len(),
            jobs_processed: self.workers.iter().map(|w| w.jobs_processed()).sum(),
            jobs_failed: self.workers.iter().map(|w| w.jobs_failed()).sum(),
        }
    }
}
