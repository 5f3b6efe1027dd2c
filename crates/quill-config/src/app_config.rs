//! Application configuration structures.

use crate::RunMode;
use quill_core::LogFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// REST server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis connection configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Queue semantics (priorities, retries, leases, TTLs).
    #[serde(default)]
    pub queue: QueueConfig,

    /// Worker loop configuration.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Collaborator endpoints the worker forwards jobs to.
    #[serde(default)]
    pub handlers: HandlersConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Environment (development, staging, production).
    pub environment: String,
    /// Which components this process runs.
    pub mode: RunMode,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "quill".to_string(),
            environment: "development".to_string(),
            mode: RunMode::default(),
        }
    }
}

/// REST server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Enable CORS.
    pub cors_enabled: bool,
    /// CORS allowed origins.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    /// Returns the bind address.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL.
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            connect_timeout_secs: 5,
        }
    }
}

impl RedisConfig {
    /// Returns the connect timeout as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Key prefix for all queue keys in the shared store.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Priority given to jobs enqueued without one (1-10).
    #[serde(default = "default_priority")]
    pub default_priority: u8,

    /// Retry budget given to jobs enqueued without one.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Largest retry budget a producer may request.
    #[serde(default = "default_max_retries_limit")]
    pub max_retries_limit: u32,

    /// Global cap on jobs in the processing set.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u64,

    /// Lease duration for a claimed job, in seconds.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,

    /// Lifetime of a job record in the store, in seconds.
    #[serde(default = "default_job_ttl")]
    pub job_ttl_secs: u64,

    /// Delay before a failed job becomes claimable again, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Priority levels removed on each retry.
    #[serde(default = "default_retry_priority_step")]
    pub retry_priority_step: u8,

    /// Lock races tolerated on one level before the scan moves on.
    #[serde(default = "default_claim_attempts")]
    pub claim_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            default_priority: default_priority(),
            default_max_retries: default_max_retries(),
            max_retries_limit: default_max_retries_limit(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            lock_ttl_secs: default_lock_ttl(),
            job_ttl_secs: default_job_ttl(),
            retry_delay_secs: default_retry_delay(),
            retry_priority_step: default_retry_priority_step(),
            claim_attempts: default_claim_attempts(),
        }
    }
}

fn default_key_prefix() -> String {
    "quill:jobs".to_string()
}

fn default_priority() -> u8 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_retries_limit() -> u32 {
    10
}

fn default_max_concurrent_jobs() -> u64 {
    5
}

fn default_lock_ttl() -> u64 {
    600 // 10 minutes
}

fn default_job_ttl() -> u64 {
    86400 * 7 // 7 days
}

fn default_retry_delay() -> u64 {
    60
}

fn default_retry_priority_step() -> u8 {
    1
}

fn default_claim_attempts() -> u32 {
    3
}

impl QueueConfig {
    /// Returns the lease duration.
    #[must_use]
    pub const fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    /// Returns the job record lifetime.
    #[must_use]
    pub const fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    /// Returns the retry delay.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Worker loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of worker loops in this process.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Sleep between polls when no job is available, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Lease refresh interval while a handler runs, in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Interval between stale-claim recovery sweeps, in seconds.
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_secs: u64,

    /// Grace period for an in-flight handler on shutdown, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            recovery_interval_secs: default_recovery_interval(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_poll_interval() -> u64 {
    1000 // 1 second
}

fn default_heartbeat_interval() -> u64 {
    60
}

fn default_recovery_interval() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl WorkerConfig {
    /// Returns poll interval as Duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns heartbeat interval as Duration.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Returns recovery interval as Duration.
    #[must_use]
    pub const fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    /// Returns shutdown timeout as Duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Collaborator endpoints, keyed by job type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlersConfig {
    /// Job type to collaborator URL.
    pub endpoints: HashMap<String, String>,
    /// Request timeout for one collaborator call, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            endpoints: HashMap::new(),
            request_timeout_secs: 300,
        }
    }
}

impl HandlersConfig {
    /// Returns the collaborator request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (json, pretty).
    pub log_format: LogFormat,
    /// Expose Prometheus metrics.
    pub metrics_enabled: bool,
    /// Metrics endpoint path.
    pub metrics_path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
        }
    }
}
