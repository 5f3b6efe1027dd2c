//! Quill Jobs - Distributed Priority Job Queue
//!
//! A Redis-backed job queue for content-generation work:
//! - Ten priority levels (10 is most urgent), FIFO within a level
//! - Exclusive claims guarded by expiring per-job leases
//! - Global cap on jobs in processing across all workers
//! - Retries with a fixed delay and priority decay
//! - Recovery of claims whose lease expired
//! - Batches of jobs tracked as a group
//!
//! # Architecture
//!
//! ```text
//!  Producer (REST / library)
//!     │ enqueue
//!     ▼
//!  ┌──────────────────────────────────────────────┐
//!  │ Store (Redis or in-memory)                   │
//!  │  queue:10 … queue:1   processing   lock:{id} │
//!  └──────────────┬───────────────────────────────┘
//!                 │ dequeue (10 → 1, oldest first)
//!                 ▼
//!  ┌──────────────────────────────────────────────┐
//!  │ WorkerPool: Worker 1 … Worker N              │
//!  │  handler ─ Ok ─► complete                    │
//!  │          └ Err ─► fail ─► retry or failed    │
//!  └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use quill_jobs::prelude::*;
//! use std::sync::Arc;
//!
//! let queue = JobQueue::new(Arc::new(MemoryStore::new()), QueueSettings::default());
//! let id = queue
//!     .enqueue(NewJob::new("generate_content", json!({"topic": "rust"})).priority(8))
//!     .await?;
//!
//! let handler = handler_fn(|job: Job| async move { Ok(Some(json!({"words": 800}))) });
//! let pool = WorkerPool::new("worker-a", queue, Arc::new(handler), WorkerSettings::default());
//! pool.start();
//! ```

pub mod batch;
pub mod error;
pub mod handler;
pub mod job;
pub mod keys;
pub mod lock;
pub mod metrics;
pub mod queue;
pub mod record;
pub mod retry;
pub mod stats;
pub mod store;
pub mod worker;

pub use batch::{Batch, BatchRequest, BatchStatus, BATCH_ID_FIELD};
pub use error::{JobError, JobResult};
pub use handler::{handler_fn, FnHandler, HandlerRegistry, JobHandler};
pub use job::{Job, JobId, JobStatus, NewJob, Priority};
pub use keys::QueueKeys;
pub use lock::LockManager;
pub use metrics::{register_metrics, JobMetrics, WorkerMetrics};
pub use queue::{JobQueue, QueueSettings};
pub use retry::{FailOutcome, RetryPolicy};
pub use stats::{QueueDepths, QueueStats};
pub use store::{create_pool, MemoryStore, RedisStore, Store};
pub use worker::{Worker, WorkerPool, WorkerPoolStats, WorkerSettings};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::handler::{handler_fn, JobHandler};
    pub use crate::job::{Job, JobId, JobStatus, NewJob, Priority};
    pub use crate::queue::{JobQueue, QueueSettings};
    pub use crate::store::{MemoryStore, Store};
    pub use crate::worker::{WorkerPool, WorkerSettings};
    pub use crate::{JobError, JobResult};
}
