//! Integration tests for JobQueue over the in-memory store.

mod common;

use common::TestQueue;
use futures::future::join_all;
use quill_jobs::{FailOutcome, JobError, JobId, JobStatus, NewJob, Priority, QueueSettings, Store};
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

fn job(job_type: &str, priority: i64) -> NewJob {
    NewJob::new(job_type, json!({"topic": job_type})).priority(priority)
}

#[tokio::test]
async fn test_highest_priority_first() {
    let t = TestQueue::new();
    let low = t.queue.enqueue(job("low", 3)).await.unwrap();
    let high = t.queue.enqueue(job("high", 9)).await.unwrap();
    let mid = t.queue.enqueue(job("mid", 5)).await.unwrap();

    let mut order = Vec::new();
    while let Some(claimed) = t.queue.dequeue("w1").await.unwrap() {
        order.push(claimed.id);
    }
    assert_eq!(order, vec![high, mid, low]);
}

#[tokio::test]
async fn test_fifo_within_level() {
    let t = TestQueue::new();
    let mut enqueued = Vec::new();
    for n in 0..5 {
        enqueued.push(t.queue.enqueue(job(&format!("article_{n}"), 5)).await.unwrap());
    }

    let mut claimed = Vec::new();
    for _ in 0..5 {
        claimed.push(t.queue.dequeue("w1").await.unwrap().unwrap().id);
    }
    assert_eq!(claimed, enqueued);
}

#[tokio::test]
async fn test_later_high_priority_job_overtakes() {
    // A(3), B(8), C(3) with room for one job at a time run as B, A, C.
    let t = TestQueue::with_settings(QueueSettings {
        max_concurrent_jobs: 1,
        ..common::settings()
    });
    let a = t.queue.enqueue(job("a", 3)).await.unwrap();
    let b = t.queue.enqueue(job("b", 8)).await.unwrap();
    let c = t.queue.enqueue(job("c", 3)).await.unwrap();

    let mut order = Vec::new();
    while let Some(claimed) = t.queue.dequeue("w1").await.unwrap() {
        assert!(t.queue.dequeue("w1").await.unwrap().is_none());
        t.queue.complete(&claimed.id, "w1", None).await.unwrap();
        order.push(claimed.id);
    }
    assert_eq!(order, vec![b, a, c]);
}

#[tokio::test]
async fn test_empty_queue_returns_none() {
    let t = TestQueue::new();
    assert!(t.queue.dequeue("w1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrency_cap() {
    let t = TestQueue::with_settings(QueueSettings {
        max_concurrent_jobs: 2,
        ..common::settings()
    });
    for n in 0..3 {
        t.queue.enqueue(job(&format!("j{n}"), 5)).await.unwrap();
    }

    let first = t.queue.dequeue("w1").await.unwrap().unwrap();
    t.queue.dequeue("w2").await.unwrap().unwrap();
    assert!(t.queue.dequeue("w3").await.unwrap().is_none());

    t.queue.complete(&first.id, "w1", None).await.unwrap();
    assert!(t.queue.dequeue("w3").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_cap_holds_under_concurrent_claims() {
    let t = TestQueue::with_settings(QueueSettings {
        max_concurrent_jobs: 2,
        ..common::settings()
    });
    let mut ids = Vec::new();
    for n in 0..6 {
        ids.push(t.queue.enqueue(job(&format!("j{n}"), 5)).await.unwrap());
    }

    let tasks = (0..8).map(|n| {
        let queue = t.queue.clone();
        tokio::spawn(async move { queue.dequeue(&format!("w{n}")).await.unwrap() })
    });
    let claimed: Vec<JobId> = join_all(tasks)
        .await
        .into_iter()
        .filter_map(|result| result.unwrap())
        .map(|job| job.id)
        .collect();

    assert!(!claimed.is_empty());
    assert!(claimed.len() <= 2);
    let depths = t.queue.queue_depths().await.unwrap();
    assert_eq!(depths.processing, claimed.len() as u64);
    assert_eq!(depths.total_pending(), 6 - claimed.len() as u64);

    for id in ids.iter().filter(|id| !claimed.contains(*id)) {
        let stored = t.queue.get_job_status(id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(t.queue.locks().owner(id.as_str()).await.unwrap(), None);
    }

    // Whatever room is left is still claimable, and no more.
    let mut total = claimed.len();
    while t.queue.dequeue("late").await.unwrap().is_some() {
        total += 1;
    }
    assert_eq!(total, 2);
    assert_eq!(t.queue.queue_depths().await.unwrap().processing, 2);
}

#[tokio::test]
async fn test_leased_head_does_not_block_level() {
    let t = TestQueue::new();
    let stuck = t.queue.enqueue(job("stuck", 5)).await.unwrap();
    let next = t.queue.enqueue(job("next", 5)).await.unwrap();
    t.queue.enqueue(job("low", 2)).await.unwrap();

    // Another claimer took the lease but never finished the claim.
    assert!(t.queue.locks().acquire(stuck.as_str(), "w1").await.unwrap());

    let claimed = t.queue.dequeue("w2").await.unwrap().unwrap();
    assert_eq!(claimed.id, next);

    let stored = t.queue.get_job_status(&stuck).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(t.queue.queue_depths().await.unwrap().levels[&5], 1);
}

#[tokio::test]
async fn test_cancel_during_claim_is_conflict() {
    let t = TestQueue::new();
    let id = t.queue.enqueue(job("generate_content", 5)).await.unwrap();

    // A claimer has taken the id off its queue but not yet recorded it.
    t.queue.locks().acquire(id.as_str(), "w1").await.unwrap();
    let queue_key = t.queue.keys().queue(Priority::new(5).unwrap());
    t.store.sorted_set_remove(&queue_key, id.as_str()).await.unwrap();

    let err = t.queue.cancel(&id).await.unwrap_err();
    assert!(matches!(err, JobError::Conflict(ref msg) if msg.contains(id.as_str())));
    let stored = t.queue.get_job_status(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dequeues_claim_each_job_once() {
    let t = TestQueue::new();
    for n in 0..3 {
        t.queue.enqueue(job(&format!("j{n}"), 5)).await.unwrap();
    }

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let queue = t.queue.clone();
            tokio::spawn(async move { queue.dequeue(&format!("w{n}")).await.unwrap() })
        })
        .collect();

    let mut claimed = Vec::new();
    for task in tasks {
        if let Some(job) = task.await.unwrap() {
            claimed.push(job.id);
        }
    }
    // A worker that lost every race may have given up; pick up leftovers.
    while let Some(job) = t.queue.dequeue("sweeper").await.unwrap() {
        claimed.push(job.id);
    }

    let unique: HashSet<JobId> = claimed.iter().cloned().collect();
    assert_eq!(claimed.len(), 3);
    assert_eq!(unique.len(), 3);
    assert_eq!(t.queue.queue_depths().await.unwrap().processing, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_workers_race_for_one_job() {
    let t = TestQueue::new();
    let id = t.queue.enqueue(job("generate_content", 5)).await.unwrap();

    let (q1, q2) = (t.queue.clone(), t.queue.clone());
    let (first, second) = tokio::join!(
        tokio::spawn(async move { q1.dequeue("w1").await.unwrap() }),
        tokio::spawn(async move { q2.dequeue("w2").await.unwrap() }),
    );
    let results = [first.unwrap(), second.unwrap()];

    let winners: Vec<_> = results.iter().flatten().collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].id, id);
}

#[tokio::test]
async fn test_complete_stores_result() {
    let t = TestQueue::new();
    let id = t.queue.enqueue(job("generate_content", 5)).await.unwrap();
    t.queue.dequeue("w1").await.unwrap().unwrap();

    let done = t
        .queue
        .complete(&id, "w1", Some(json!({"words": 812})))
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let stored = t.queue.get_job_status(&id).await.unwrap().unwrap();
    assert_eq!(stored.result, Some(json!({"words": 812})));
    assert!(stored.completed_at.is_some());
    assert_eq!(t.queue.locks().owner(id.as_str()).await.unwrap(), None);

    // A finished job cannot be completed twice.
    assert!(t.queue.complete(&id, "w1", None).await.is_err());
}

#[tokio::test]
async fn test_only_lock_owner_may_finish() {
    let t = TestQueue::new();
    let id = t.queue.enqueue(job("generate_content", 5)).await.unwrap();
    t.queue.dequeue("w1").await.unwrap().unwrap();

    let err = t.queue.complete(&id, "w2", None).await.unwrap_err();
    assert!(matches!(err, JobError::NotLockOwner { .. }));
    let err = t.queue.fail(&id, "w2", "boom").await.unwrap_err();
    assert!(matches!(err, JobError::NotLockOwner { .. }));

    let stored = t.queue.get_job_status(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.worker_id.as_deref(), Some("w1"));
}

#[tokio::test]
async fn test_retry_until_exhausted() {
    let t = TestQueue::new();
    let id = t
        .queue
        .enqueue(job("generate_content", 5).max_retries(2))
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    for attempt in 0..3 {
        let claimed = t.queue.dequeue("w1").await.unwrap().unwrap();
        assert_eq!(claimed.current_retry, attempt);
        outcomes.push(t.queue.fail(&id, "w1", "model timeout").await.unwrap());
    }

    assert!(matches!(
        outcomes[0],
        FailOutcome::Retried { attempt: 1, priority, .. } if priority.get() == 4
    ));
    assert!(matches!(
        outcomes[1],
        FailOutcome::Retried { attempt: 2, priority, .. } if priority.get() == 3
    ));
    assert_eq!(outcomes[2], FailOutcome::Exhausted);

    let stored = t.queue.get_job_status(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.current_retry, 2);
    assert_eq!(stored.error.as_deref(), Some("model timeout"));
    assert!(t.queue.dequeue("w1").await.unwrap().is_none());

    let stats = t.queue.get_queue_stats().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.processing, 0);
}

#[tokio::test]
async fn test_zero_retries_fails_immediately() {
    let t = TestQueue::new();
    let id = t.queue.enqueue(job("x", 5).max_retries(0)).await.unwrap();
    t.queue.dequeue("w1").await.unwrap().unwrap();

    assert_eq!(t.queue.fail(&id, "w1", "bad input").await.unwrap(), FailOutcome::Exhausted);
}

#[tokio::test]
async fn test_retry_priority_never_below_one() {
    let t = TestQueue::new();
    let id = t.queue.enqueue(job("x", 1)).await.unwrap();
    t.queue.dequeue("w1").await.unwrap().unwrap();

    let outcome = t.queue.fail(&id, "w1", "boom").await.unwrap();
    assert!(matches!(outcome, FailOutcome::Retried { priority, .. } if priority == Priority::MIN));
}

#[tokio::test]
async fn test_retry_waits_for_delay() {
    let t = TestQueue::with_settings(QueueSettings {
        retry: quill_jobs::RetryPolicy::new(Duration::from_millis(200), 1),
        ..common::settings()
    });
    let id = t.queue.enqueue(job("generate_content", 5)).await.unwrap();
    t.queue.dequeue("w1").await.unwrap().unwrap();
    t.queue.fail(&id, "w1", "rate limited").await.unwrap();

    // The delayed retry is not eligible yet, but other work is.
    let other = t.queue.enqueue(job("publish_content", 1)).await.unwrap();
    assert_eq!(t.queue.dequeue("w2").await.unwrap().unwrap().id, other);
    assert!(t.queue.dequeue("w2").await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(250)).await;
    let retried = t.queue.dequeue("w2").await.unwrap().unwrap();
    assert_eq!(retried.id, id);
    assert_eq!(retried.priority.get(), 4);
    assert_eq!(retried.current_retry, 1);
    assert_eq!(retried.worker_id.as_deref(), Some("w2"));
}

#[tokio::test]
async fn test_cancel_pending_job() {
    let t = TestQueue::new();
    let id = t.queue.enqueue(job("generate_content", 5)).await.unwrap();

    let cancelled = t.queue.cancel(&id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(t.queue.dequeue("w1").await.unwrap().is_none());

    let err = t.queue.cancel(&id).await.unwrap_err();
    assert!(matches!(err, JobError::InvalidState { ref actual, .. } if actual == "cancelled"));

    let stats = t.queue.get_queue_stats().await.unwrap();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_cancel_rejects_claimed_and_unknown_jobs() {
    let t = TestQueue::new();
    let id = t.queue.enqueue(job("generate_content", 5)).await.unwrap();
    t.queue.dequeue("w1").await.unwrap().unwrap();

    let err = t.queue.cancel(&id).await.unwrap_err();
    assert!(matches!(err, JobError::InvalidState { ref actual, .. } if actual == "processing"));

    let err = t.queue.cancel(&JobId::from("nope")).await.unwrap_err();
    assert!(matches!(err, JobError::NotFound { .. }));
}

#[tokio::test]
async fn test_recover_expired_lease() {
    let t = TestQueue::with_settings(QueueSettings {
        lock_ttl: Duration::from_millis(100),
        ..common::settings()
    });
    let id = t.queue.enqueue(job("generate_content", 7)).await.unwrap();
    t.queue.dequeue("w1").await.unwrap().unwrap();

    // Live leases are left alone.
    assert_eq!(t.queue.recover_stale().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(t.queue.recover_stale().await.unwrap(), 1);

    let stored = t.queue.get_job_status(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.current_retry, 0);
    assert_eq!(stored.priority.get(), 7);

    let reclaimed = t.queue.dequeue("w2").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, id);

    // The original worker lost its lease.
    let err = t.queue.complete(&id, "w1", None).await.unwrap_err();
    assert!(matches!(err, JobError::NotLockOwner { .. }));
    t.queue.complete(&id, "w2", None).await.unwrap();
}

#[tokio::test]
async fn test_refresh_lease_keeps_claim() {
    let t = TestQueue::with_settings(QueueSettings {
        lock_ttl: Duration::from_millis(150),
        ..common::settings()
    });
    let id = t.queue.enqueue(job("generate_content", 5)).await.unwrap();
    t.queue.dequeue("w1").await.unwrap().unwrap();

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(t.queue.refresh_lease(&id, "w1").await.unwrap());
    }
    assert!(!t.queue.refresh_lease(&id, "w2").await.unwrap());
    assert_eq!(t.queue.recover_stale().await.unwrap(), 0);
    t.queue.complete(&id, "w1", None).await.unwrap();
}

#[tokio::test]
async fn test_stats_and_depths() {
    let t = TestQueue::new();
    let first = t.queue.enqueue(job("a", 8)).await.unwrap();
    t.queue.enqueue(job("b", 5)).await.unwrap();
    t.queue.enqueue(job("c", 5)).await.unwrap();

    t.queue.dequeue("w1").await.unwrap().unwrap();
    t.queue.complete(&first, "w1", None).await.unwrap();

    let stats = t.queue.get_queue_stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.processing, 0);

    let depths = t.queue.queue_depths().await.unwrap();
    assert_eq!(depths.levels.len(), 10);
    assert_eq!(depths.levels[&5], 2);
    assert_eq!(depths.levels[&8], 0);
    assert_eq!(depths.total_pending(), 2);
}

#[tokio::test]
async fn test_store_outage() {
    let t = TestQueue::new();
    t.store.set_unavailable(true);

    assert!(t.queue.health_check().await.is_err());
    let err = t.queue.enqueue(job("a", 5)).await.unwrap_err();
    assert!(err.is_store_error());

    t.store.set_unavailable(false);
    assert!(t.queue.health_check().await.is_ok());
}
