//! Shared store contract.
//!
//! Every piece of queue state (records, priority sets, the processing set,
//! leases and counters) lives behind [`Store`]. Workers and producers share
//! nothing else, so any number of processes can point at one Redis.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::{create_pool, RedisStore};

use crate::error::JobResult;
use async_trait::async_trait;
use quill_core::Interface;
use std::collections::HashMap;
use std::time::Duration;

/// Key-value, sorted-set and hash primitives the queue is built from.
///
/// Single calls are atomic. The compare-and-act methods
/// (`set_if_absent_with_ttl`, `delete_if_equals`, `expire_if_equals`,
/// `sorted_set_add_bounded`) are atomic as a whole.
#[async_trait]
pub trait Store: Interface {
    /// Reads a string value. Expired keys read as `None`.
    async fn get(&self, key: &str) -> JobResult<Option<String>>;

    /// Writes a string value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> JobResult<()>;

    /// Writes only if the key does not exist. Returns true if written.
    async fn set_if_absent_with_ttl(&self, key: &str, value: &str, ttl: Duration)
        -> JobResult<bool>;

    /// Deletes a key. Returns true if it existed.
    async fn delete(&self, key: &str) -> JobResult<bool>;

    /// Deletes a key only if its value equals `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> JobResult<bool>;

    /// Resets a key's TTL only if its value equals `expected`.
    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> JobResult<bool>;

    /// Adds a member, or updates its score.
    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> JobResult<()>;

    /// Adds a member only while the set holds fewer than `max_len` members.
    ///
    /// Updating an existing member always succeeds. Returns false if the
    /// cap prevented the add.
    async fn sorted_set_add_bounded(
        &self,
        key: &str,
        member: &str,
        score: f64,
        max_len: u64,
    ) -> JobResult<bool>;

    /// Removes a member. Returns true if it was present.
    async fn sorted_set_remove(&self, key: &str, member: &str) -> JobResult<bool>;

    /// Members with `min <= score <= max`, lowest score first.
    ///
    /// Infinite bounds are allowed.
    async fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<usize>,
    ) -> JobResult<Vec<(String, f64)>>;

    /// Number of members.
    async fn sorted_set_cardinality(&self, key: &str) -> JobResult<u64>;

    /// Adds `delta` to a hash field and returns the new value.
    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> JobResult<i64>;

    /// Reads every field of a counter hash.
    async fn hash_get_all(&self, key: &str) -> JobResult<HashMap<String, i64>>;

    /// Round-trips to the store.
    async fn ping(&self) -> JobResult<()>;
}
