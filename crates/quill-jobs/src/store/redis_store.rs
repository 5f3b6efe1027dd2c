//! Redis-backed store.

use super::Store;
use crate::error::{JobError, JobResult};
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use quill_config::RedisConfig;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

const DELETE_IF_EQUALS_LUA: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

const EXPIRE_IF_EQUALS_LUA: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
";

const ADD_BOUNDED_LUA: &str = r"
if redis.call('ZSCORE', KEYS[1], ARGV[2]) then
    redis.call('ZADD', KEYS[1], ARGV[1], ARGV[2])
    return 1
end
if redis.call('ZCARD', KEYS[1]) >= tonumber(ARGV[3]) then
    return 0
end
redis.call('ZADD', KEYS[1], ARGV[1], ARGV[2])
return 1
";

/// Create a Redis connection pool and check that the server answers.
pub async fn create_pool(config: &RedisConfig) -> JobResult<Pool> {
    info!("Creating Redis connection pool for job queue...");

    let cfg = Config::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| JobError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| JobError::Configuration(format!("Failed to create pool: {}", e)))?;

    let store = RedisStore::new(pool.clone());
    tokio::time::timeout(config.connect_timeout(), store.ping())
        .await
        .map_err(|_| {
            JobError::Store(format!(
                "Redis did not answer within {}s",
                config.connect_timeout_secs
            ))
        })??;

    info!("Redis connection pool created successfully");

    Ok(pool)
}

/// Redis store over a deadpool connection pool.
///
/// The compare-and-act primitives run as Lua scripts so that the check and
/// the write happen in one server-side step.
pub struct RedisStore {
    pool: Pool,
    delete_if_equals_script: Script,
    expire_if_equals_script: Script,
    add_bounded_script: Script,
}

impl RedisStore {
    /// Create a store over an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            delete_if_equals_script: Script::new(DELETE_IF_EQUALS_LUA),
            expire_if_equals_script: Script::new(EXPIRE_IF_EQUALS_LUA),
            add_bounded_script: Script::new(ADD_BOUNDED_LUA),
        }
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> JobResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

/// Formats a score bound the way ZRANGEBYSCORE expects it.
fn score_bound(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> JobResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> JobResult<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut *conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> JobResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> JobResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = self
            .delete_if_equals_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut *conn)
            .await?;
        Ok(removed != 0)
    }

    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration) -> JobResult<bool> {
        let mut conn = self.conn().await?;
        let refreshed: i64 = self
            .expire_if_equals_script
            .key(key)
            .arg(expected)
            .arg(millis(ttl))
            .invoke_async(&mut *conn)
            .await?;
        Ok(refreshed != 0)
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> JobResult<()> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn sorted_set_add_bounded(
        &self,
        key: &str,
        member: &str,
        score: f64,
        max_len: u64,
    ) -> JobResult<bool> {
        let mut conn = self.conn().await?;
        let added: i64 = self
            .add_bounded_script
            .key(key)
            .arg(score)
            .arg(member)
            .arg(max_len)
            .invoke_async(&mut *conn)
            .await?;
        Ok(added != 0)
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> JobResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }

    async fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<usize>,
    ) -> JobResult<Vec<(String, f64)>> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("ZRANGEBYSCORE");
        cmd.arg(key)
            .arg(score_bound(min))
            .arg(score_bound(max))
            .arg("WITHSCORES");
        if let Some(limit) = limit {
            cmd.arg("LIMIT").arg(0).arg(limit);
        }
        Ok(cmd.query_async(&mut *conn).await?)
    }

    async fn sorted_set_cardinality(&self, key: &str) -> JobResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(key).await?)
    }

    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> JobResult<i64> {
        let mut conn = self.conn().await?;
        Ok(conn.hincr(key, field, delta).await?)
    }

    async fn hash_get_all(&self, key: &str) -> JobResult<HashMap<String, i64>> {
        let mut conn = self.conn().await?;
        Ok(conn.hgetall(key).await?)
    }

    async fn ping(&self) -> JobResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok(())
    }
}
