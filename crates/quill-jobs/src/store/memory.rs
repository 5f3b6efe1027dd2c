//! In-process store.

use super::Store;
use crate::error::{JobError, JobResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
struct Inner {
    strings: HashMap<String, (String, Instant)>,
    sorted_sets: HashMap<String, HashMap<String, f64>>,
    hashes: HashMap<String, HashMap<String, i64>>,
}

impl Inner {
    /// Returns the live value of a string key, dropping it if expired.
    fn live(&mut self, key: &str) -> Option<&mut (String, Instant)> {
        let expired = self
            .strings
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at <= Instant::now());
        if expired {
            self.strings.remove(key);
        }
        self.strings.get_mut(key)
    }
}

/// Store kept in process memory.
///
/// Used by tests and by single-process development setups. Every call takes
/// one mutex, which makes the compare-and-act methods atomic. Expiry uses
/// `tokio::time`, so paused-clock tests can advance past a TTL.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with a store error (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> JobResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(JobError::Store("memory store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> JobResult<Option<String>> {
        self.check()?;
        let mut inner = self.inner.lock();
        Ok(inner.live(key).map(|(value, _)| value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> JobResult<()> {
        self.check()?;
        self.inner
            .lock()
            .strings
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> JobResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock();
        if inner.live(key).is_some() {
            return Ok(false);
        }
        inner
            .strings
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> JobResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock();
        let existed = inner.live(key).is_some();
        inner.strings.remove(key);
        Ok(existed)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> JobResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock();
        let matches = inner.live(key).is_some_and(|(value, _)| value == expected);
        if matches {
            inner.strings.remove(key);
        }
        Ok(matches)
    }

    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> JobResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock();
        match inner.live(key) {
            Some((value, expires_at)) if value == expected => {
                *expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> JobResult<()> {
        self.check()?;
        self.inner
            .lock()
            .sorted_sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn sorted_set_add_bounded(
        &self,
        key: &str,
        member: &str,
        score: f64,
        max_len: u64,
    ) -> JobResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock();
        let set = inner.sorted_sets.entry(key.to_string()).or_default();
        if !set.contains_key(member) && set.len() as u64 >= max_len {
            return Ok(false);
        }
        set.insert(member.to_string(), score);
        Ok(true)
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> JobResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock();
        Ok(inner
            .sorted_sets
            .get_mut(key)
            .is_some_and(|set| set.remove(member).is_some()))
    }

    async fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<usize>,
    ) -> JobResult<Vec<(String, f64)>> {
        self.check()?;
        let inner = self.inner.lock();
        let Some(set) = inner.sorted_sets.get(key) else {
            return Ok(Vec::new());
        };

        let mut members: Vec<(String, f64)> = set
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            .map(|(member, score)| (member.clone(), *score))
            .collect();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(limit) = limit {
            members.truncate(limit);
        }
        Ok(members)
    }

    async fn sorted_set_cardinality(&self, key: &str) -> JobResult<u64> {
        self.check()?;
        let inner = self.inner.lock();
        Ok(inner.sorted_sets.get(key).map_or(0, |set| set.len() as u64))
    }

    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> JobResult<i64> {
        self.check()?;
        let mut inner = self.inner.lock();
        let value = inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert(0);
        *value += delta;
        Ok(*value)
    }

    async fn hash_get_all(&self, key: &str) -> JobResult<HashMap<String, i64>> {
        self.check()?;
        let inner = self.inner.lock();
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> JobResult<()> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.set_if_absent_with_ttl("k", "a", ttl).await.unwrap());
        assert!(!store.set_if_absent_with_ttl("k", "b", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("k", "v", Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store
            .set_if_absent_with_ttl("k", "w", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_checked_ops() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);
        store.set_with_ttl("lock", "w1", ttl).await.unwrap();

        assert!(!store.expire_if_equals("lock", "w2", ttl).await.unwrap());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.expire_if_equals("lock", "w1", ttl).await.unwrap());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.get("lock").await.unwrap().is_some());

        assert!(!store.delete_if_equals("lock", "w2").await.unwrap());
        assert!(store.delete_if_equals("lock", "w1").await.unwrap());
        assert!(store.get("lock").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_range_by_score_orders_and_limits() {
        let store = MemoryStore::new();
        store.sorted_set_add("z", "c", 3.0).await.unwrap();
        store.sorted_set_add("z", "a", 1.0).await.unwrap();
        store.sorted_set_add("z", "b", 2.0).await.unwrap();

        let all = store
            .sorted_set_range_by_score("z", f64::NEG_INFINITY, f64::INFINITY, None)
            .await
            .unwrap();
        let members: Vec<&str> = all.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(members, vec!["a", "b", "c"]);

        let first = store
            .sorted_set_range_by_score("z", f64::NEG_INFINITY, 2.5, Some(1))
            .await
            .unwrap();
        assert_eq!(first, vec![("a".to_string(), 1.0)]);
    }

    #[tokio::test]
    async fn test_bounded_add() {
        let store = MemoryStore::new();
        assert!(store.sorted_set_add_bounded("p", "a", 1.0, 2).await.unwrap());
        assert!(store.sorted_set_add_bounded("p", "b", 2.0, 2).await.unwrap());
        assert!(!store.sorted_set_add_bounded("p", "c", 3.0, 2).await.unwrap());
        assert!(store.sorted_set_add_bounded("p", "a", 4.0, 2).await.unwrap());
        assert_eq!(store.sorted_set_cardinality("p").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_hash_counters() {
        let store = MemoryStore::new();
        assert_eq!(store.hash_increment("s", "pending", 2).await.unwrap(), 2);
        assert_eq!(store.hash_increment("s", "pending", -1).await.unwrap(), 1);
        let all = store.hash_get_all("s").await.unwrap();
        assert_eq!(all.get("pending"), Some(&1));
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(store.ping().await.unwrap_err().is_store_error());
        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
}
