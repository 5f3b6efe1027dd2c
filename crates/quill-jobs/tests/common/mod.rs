//! Common test infrastructure for queue integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use quill_config::RedisConfig;
use quill_jobs::{
    create_pool, JobError, JobQueue, JobResult, MemoryStore, QueueSettings, RedisStore,
    RetryPolicy, Store,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Environment variable naming a Redis server for the Redis-backed tests.
pub const REDIS_URL_VAR: &str = "QUILL_TEST_REDIS_URL";

/// Queue settings with an immediate retry delay so tests never wait on it.
pub fn settings() -> QueueSettings {
    QueueSettings {
        retry: RetryPolicy::new(Duration::ZERO, 1),
        ..QueueSettings::default()
    }
}

/// A queue over a fresh in-memory store.
pub struct TestQueue {
    pub queue: JobQueue,
    pub store: Arc<MemoryStore>,
}

impl TestQueue {
    pub fn new() -> Self {
        Self::with_settings(settings())
    }

    pub fn with_settings(settings: QueueSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let queue = JobQueue::new(store.clone(), settings);
        Self { queue, store }
    }
}

/// In-memory store that can fail chosen calls.
///
/// A fault names a store method and a fragment of the key; the next matching
/// call returns a store error and the fault is used up.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Mutex<Vec<(&'static str, String)>>,
    hide_cardinality: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `method` call whose key contains `key_part`.
    pub fn fail_once(&self, method: &'static str, key_part: &str) {
        self.faults.lock().push((method, key_part.to_string()));
    }

    /// Reports every sorted set as empty, so the claim pre-check always
    /// passes and only the bounded add enforces the cap.
    pub fn hide_cardinality(&self, hide: bool) {
        self.hide_cardinality.store(hide, Ordering::SeqCst);
    }

    fn check(&self, method: &'static str, key: &str) -> JobResult<()> {
        let mut faults = self.faults.lock();
        let hit = faults
            .iter()
            .position(|(m, part)| *m == method && key.contains(part.as_str()));
        match hit {
            Some(index) => {
                faults.remove(index);
                Err(JobError::Store(format!("injected {method} failure on {key}")))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn get(&self, key: &str) -> JobResult<Option<String>> {
        self.check("get", key)?;
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> JobResult<()> {
        self.check("set_with_ttl", key)?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> JobResult<bool> {
        self.check("set_if_absent_with_ttl", key)?;
        self.inner.set_if_absent_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> JobResult<bool> {
        self.check("delete", key)?;
        self.inner.delete(key).await
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> JobResult<bool> {
        self.check("delete_if_equals", key)?;
        self.inner.delete_if_equals(key, expected).await
    }

    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> JobResult<bool> {
        self.check("expire_if_equals", key)?;
        self.inner.expire_if_equals(key, expected, ttl).await
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> JobResult<()> {
        self.check("sorted_set_add", key)?;
        self.inner.sorted_set_add(key, member, score).await
    }

    async fn sorted_set_add_bounded(
        &self,
        key: &str,
        member: &str,
        score: f64,
        max_len: u64,
    ) -> JobResult<bool> {
        self.check("sorted_set_add_bounded", key)?;
        self.inner.sorted_set_add_bounded(key, member, score, max_len).await
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> JobResult<bool> {
        self.check("sorted_set_remove", key)?;
        self.inner.sorted_set_remove(key, member).await
    }

    async fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<usize>,
    ) -> JobResult<Vec<(String, f64)>> {
        self.check("sorted_set_range_by_score", key)?;
        self.inner.sorted_set_range_by_score(key, min, max, limit).await
    }

    async fn sorted_set_cardinality(&self, key: &str) -> JobResult<u64> {
        self.check("sorted_set_cardinality", key)?;
        if self.hide_cardinality.load(Ordering::SeqCst) {
            return Ok(0);
        }
        self.inner.sorted_set_cardinality(key).await
    }

    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> JobResult<i64> {
        self.check("hash_increment", key)?;
        self.inner.hash_increment(key, field, delta).await
    }

    async fn hash_get_all(&self, key: &str) -> JobResult<HashMap<String, i64>> {
        self.check("hash_get_all", key)?;
        self.inner.hash_get_all(key).await
    }

    async fn ping(&self) -> JobResult<()> {
        self.check("ping", "")?;
        self.inner.ping().await
    }
}

/// A queue over a [`FaultyStore`].
pub struct FaultyQueue {
    pub queue: JobQueue,
    pub store: Arc<FaultyStore>,
}

impl FaultyQueue {
    pub fn with_settings(settings: QueueSettings) -> Self {
        let store = Arc::new(FaultyStore::new());
        let queue = JobQueue::new(store.clone(), settings);
        Self { queue, store }
    }
}

/// A queue over the Redis server named by `QUILL_TEST_REDIS_URL`.
///
/// Each call gets its own key prefix so tests do not see each other's jobs.
/// Returns `None` when the variable is unset.
pub async fn redis_queue(settings: QueueSettings) -> Option<JobQueue> {
    let url = std::env::var(REDIS_URL_VAR).ok()?;
    let config = RedisConfig {
        url,
        ..RedisConfig::default()
    };
    let pool = create_pool(&config)
        .await
        .expect("Failed to connect to test Redis");
    let store: Arc<dyn Store> = Arc::new(RedisStore::new(pool));

    let settings = QueueSettings {
        key_prefix: format!("quill:test:{}", Uuid::new_v4().simple()),
        ..settings
    };
    Some(JobQueue::new(store, settings))
}
