//! Integration tests against a real Redis server.
//!
//! Skipped unless `QUILL_TEST_REDIS_URL` is set, e.g.
//! `QUILL_TEST_REDIS_URL=redis://127.0.0.1:6379 cargo test -p quill-jobs`.

mod common;

use quill_jobs::{FailOutcome, JobError, JobStatus, NewJob, QueueSettings};
use serde_json::json;
use std::time::Duration;

macro_rules! redis_queue_or_skip {
    ($settings:expr) => {
        match common::redis_queue($settings).await {
            Some(queue) => queue,
            None => {
                eprintln!("{} not set, skipping", common::REDIS_URL_VAR);
                return;
            }
        }
    };
}

#[tokio::test]
async fn test_redis_priority_and_fifo() {
    let queue = redis_queue_or_skip!(common::settings());

    let a = queue.enqueue(NewJob::new("a", json!({})).priority(5)).await.unwrap();
    let b = queue.enqueue(NewJob::new("b", json!({})).priority(8)).await.unwrap();
    let c = queue.enqueue(NewJob::new("c", json!({})).priority(5)).await.unwrap();

    let mut order = Vec::new();
    while let Some(job) = queue.dequeue("w1").await.unwrap() {
        order.push(job.id);
    }
    assert_eq!(order, vec![b, a, c]);
}

#[tokio::test]
async fn test_redis_lifecycle() {
    let queue = redis_queue_or_skip!(common::settings());
    let id = queue
        .enqueue(NewJob::new("generate_content", json!({"topic": "redis"})).max_retries(1))
        .await
        .unwrap();

    queue.dequeue("w1").await.unwrap().unwrap();
    assert!(matches!(
        queue.complete(&id, "w2", None).await,
        Err(JobError::NotLockOwner { .. })
    ));
    assert!(matches!(
        queue.fail(&id, "w1", "boom").await.unwrap(),
        FailOutcome::Retried { attempt: 1, .. }
    ));

    queue.dequeue("w1").await.unwrap().unwrap();
    assert_eq!(queue.fail(&id, "w1", "boom").await.unwrap(), FailOutcome::Exhausted);

    let job = queue.get_job_status(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(queue.health_check().await.is_ok());
}

#[tokio::test]
async fn test_redis_cap_and_recovery() {
    let queue = redis_queue_or_skip!(QueueSettings {
        max_concurrent_jobs: 1,
        lock_ttl: Duration::from_millis(200),
        ..common::settings()
    });
    let first = queue.enqueue(NewJob::new("a", json!({}))).await.unwrap();
    queue.enqueue(NewJob::new("b", json!({}))).await.unwrap();

    assert_eq!(queue.dequeue("w1").await.unwrap().unwrap().id, first);
    assert!(queue.dequeue("w2").await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(queue.recover_stale().await.unwrap(), 1);
    assert_eq!(queue.dequeue("w2").await.unwrap().unwrap().worker_id.as_deref(), Some("w2"));
}
