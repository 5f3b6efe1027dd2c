//! Prometheus metrics for job queue monitoring.
//!
//! Metrics go through the `metrics` facade; whichever recorder the binary
//! installs (Prometheus in `quill-server`) collects them. Without a recorder
//! every call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the job queue.
pub mod names {
    /// Total jobs admitted.
    pub const JOBS_ENQUEUED_TOTAL: &str = "quill_jobs_enqueued_total";
    /// Total claims handed to workers.
    pub const JOBS_CLAIMED_TOTAL: &str = "quill_jobs_claimed_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "quill_jobs_completed_total";
    /// Total jobs that reached terminal failure.
    pub const JOBS_FAILED_TOTAL: &str = "quill_jobs_failed_total";
    /// Total retries scheduled.
    pub const JOBS_RETRIED_TOTAL: &str = "quill_jobs_retried_total";
    /// Total jobs cancelled.
    pub const JOBS_CANCELLED_TOTAL: &str = "quill_jobs_cancelled_total";
    /// Total stale claims returned to their queues.
    pub const JOBS_RECOVERED_TOTAL: &str = "quill_jobs_recovered_total";

    /// Current size of the processing set.
    pub const JOBS_PROCESSING: &str = "quill_jobs_processing";
    /// Current size of each priority queue.
    pub const JOBS_PENDING: &str = "quill_jobs_pending";

    /// Handler duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "quill_job_duration_seconds";
    /// Time from creation to claim in seconds.
    pub const JOB_WAIT_TIME_SECONDS: &str = "quill_job_wait_time_seconds";

    /// Running worker loops.
    pub const WORKERS_ACTIVE: &str = "quill_workers_active";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(
        names::JOBS_CLAIMED_TOTAL,
        "Total number of jobs claimed by workers"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of jobs that failed after exhausting retries"
    );
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of job retries");
    describe_counter!(names::JOBS_CANCELLED_TOTAL, "Total number of jobs cancelled");
    describe_counter!(
        names::JOBS_RECOVERED_TOTAL,
        "Total number of expired claims returned to their queue"
    );

    describe_gauge!(names::JOBS_PROCESSING, "Current number of claimed jobs");
    describe_gauge!(
        names::JOBS_PENDING,
        "Current number of jobs waiting per priority level"
    );

    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job handler duration in seconds"
    );
    describe_histogram!(
        names::JOB_WAIT_TIME_SECONDS,
        "Time between job creation and claim in seconds"
    );

    describe_gauge!(names::WORKERS_ACTIVE, "Number of running worker loops");
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job enqueued.
    pub fn job_enqueued(job_type: &str, priority: u8) {
        counter!(
            names::JOBS_ENQUEUED_TOTAL,
            "job_type" => job_type.to_string(),
            "priority" => priority.to_string()
        )
        .increment(1);
    }

    /// Record a job claimed, with the time it waited since creation.
    pub fn job_claimed(job_type: &str, priority: u8, wait_time: Duration) {
        counter!(
            names::JOBS_CLAIMED_TOTAL,
            "job_type" => job_type.to_string(),
            "priority" => priority.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_WAIT_TIME_SECONDS,
            "job_type" => job_type.to_string()
        )
        .record(wait_time.as_secs_f64());
    }

    /// Record a job completed.
    pub fn job_completed(job_type: &str) {
        counter!(
            names::JOBS_COMPLETED_TOTAL,
            "job_type" => job_type.to_string()
        )
        .increment(1);
    }

    /// Record a terminal failure.
    pub fn job_failed(job_type: &str) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "job_type" => job_type.to_string()
        )
        .increment(1);
    }

    /// Record a retry.
    pub fn job_retried(job_type: &str, attempt: u32) {
        counter!(
            names::JOBS_RETRIED_TOTAL,
            "job_type" => job_type.to_string(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
    }

    /// Record a job cancelled.
    pub fn job_cancelled(job_type: &str) {
        counter!(
            names::JOBS_CANCELLED_TOTAL,
            "job_type" => job_type.to_string()
        )
        .increment(1);
    }

    /// Record stale claims returned to their queues.
    pub fn jobs_recovered(count: u64) {
        counter!(names::JOBS_RECOVERED_TOTAL).increment(count);
    }

    /// Record how long a handler ran.
    pub fn handler_duration(job_type: &str, status: &'static str, duration: Duration) {
        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_type" => job_type.to_string(),
            "status" => status
        )
        .record(duration.as_secs_f64());
    }

    /// Update queue size gauges.
    pub fn update_queue_depths(pending: &[(u8, u64)], processing: u64) {
        for (priority, depth) in pending {
            gauge!(
                names::JOBS_PENDING,
                "priority" => priority.to_string()
            )
            .set(*depth as f64);
        }
        gauge!(names::JOBS_PROCESSING).set(processing as f64);
    }
}

/// Worker metrics recorder.
#[derive(Clone)]
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Update the number of running loops in a pool.
    pub fn update_workers(pool_id: &str, active: usize) {
        gauge!(
            names::WORKERS_ACTIVE,
            "pool_id" => pool_id.to_string()
        )
        .set(active as f64);
    }
}
