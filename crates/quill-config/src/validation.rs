//! Configuration validation.
//!
//! Every rule runs and every failure is collected.

use crate::AppConfig;
use std::fmt;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Port number is invalid (must be 1-65535).
    InvalidPort { name: String, value: u16 },
    /// Priority is outside 1-10.
    InvalidPriority { name: String, value: u8 },
    /// A value that must be positive is zero.
    MustBePositive { name: String },
    /// Default retry budget exceeds the admission limit.
    RetryLimitExceeded { default: u32, limit: u32 },
    /// Heartbeat would not refresh the lease before it expires.
    HeartbeatTooSlow { heartbeat_secs: u64, lock_ttl_secs: u64 },
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Key prefix is empty.
    EmptyKeyPrefix,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPort { name, value } => {
                write!(f, "Invalid port for {}: {} (must be 1-65535)", name, value)
            }
            Self::InvalidPriority { name, value } => {
                write!(f, "Invalid priority for {}: {} (must be 1-10)", name, value)
            }
            Self::MustBePositive { name } => write!(f, "'{}' must be positive", name),
            Self::RetryLimitExceeded { default, limit } => {
                write!(
                    f,
                    "Default max retries ({}) exceeds max_retries_limit ({})",
                    default, limit
                )
            }
            Self::HeartbeatTooSlow {
                heartbeat_secs,
                lock_ttl_secs,
            } => {
                write!(
                    f,
                    "Heartbeat interval ({}s) must be shorter than lock TTL ({}s)",
                    heartbeat_secs, lock_ttl_secs
                )
            }
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::InvalidLogLevel { value } => {
                write!(
                    f,
                    "Invalid log level: '{}' (valid: trace, debug, info, warn, error)",
                    value
                )
            }
            Self::EmptyKeyPrefix => write!(f, "Queue key prefix cannot be empty"),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_server(&config.server, &mut errors);
        Self::validate_redis(&config.redis, &mut errors);
        Self::validate_queue(&config.queue, &mut errors);
        Self::validate_worker(config, &mut errors);
        Self::validate_handlers(&config.handlers, &mut errors);
        Self::validate_observability(&config.observability, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_server(config: &crate::ServerConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.port == 0 {
            errors.push(ConfigValidationError::InvalidPort {
                name: "server.port".to_string(),
                value: config.port,
            });
        }
        if config.request_timeout_secs == 0 {
            errors.push(ConfigValidationError::MustBePositive {
                name: "server.request_timeout_secs".to_string(),
            });
        }
    }

    fn validate_redis(config: &crate::RedisConfig, errors: &mut Vec<ConfigValidationError>) {
        match Url::parse(&config.url) {
            Ok(url) if url.scheme() == "redis" || url.scheme() == "rediss" => {}
            Ok(_) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL must start with redis:// or rediss://".to_string(),
            }),
            Err(e) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: e.to_string(),
            }),
        }

        if config.pool_size == 0 {
            errors.push(ConfigValidationError::MustBePositive {
                name: "redis.pool_size".to_string(),
            });
        }
    }

    fn validate_queue(config: &crate::QueueConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.key_prefix.is_empty() {
            errors.push(ConfigValidationError::EmptyKeyPrefix);
        }
        if !(1..=10).contains(&config.default_priority) {
            errors.push(ConfigValidationError::InvalidPriority {
                name: "queue.default_priority".to_string(),
                value: config.default_priority,
            });
        }
        if config.default_max_retries > config.max_retries_limit {
            errors.push(ConfigValidationError::RetryLimitExceeded {
                default: config.default_max_retries,
                limit: config.max_retries_limit,
            });
        }

        let positive = [
            ("queue.max_concurrent_jobs", config.max_concurrent_jobs),
            ("queue.lock_ttl_secs", config.lock_ttl_secs),
            ("queue.job_ttl_secs", config.job_ttl_secs),
            ("queue.claim_attempts", u64::from(config.claim_attempts)),
        ];
        for (name, value) in positive {
            if value == 0 {
                errors.push(ConfigValidationError::MustBePositive {
                    name: name.to_string(),
                });
            }
        }
    }

    fn validate_worker(config: &AppConfig, errors: &mut Vec<ConfigValidationError>) {
        let worker = &config.worker;
        if worker.concurrency == 0 {
            errors.push(ConfigValidationError::MustBePositive {
                name: "worker.concurrency".to_string(),
            });
        }
        if worker.poll_interval_ms == 0 {
            errors.push(ConfigValidationError::MustBePositive {
                name: "worker.poll_interval_ms".to_string(),
            });
        }
        if worker.heartbeat_interval_secs == 0 {
            errors.push(ConfigValidationError::MustBePositive {
                name: "worker.heartbeat_interval_secs".to_string(),
            });
        } else if worker.heartbeat_interval_secs >= config.queue.lock_ttl_secs {
            errors.push(ConfigValidationError::HeartbeatTooSlow {
                heartbeat_secs: worker.heartbeat_interval_secs,
                lock_ttl_secs: config.queue.lock_ttl_secs,
            });
        }
    }

    fn validate_handlers(config: &crate::HandlersConfig, errors: &mut Vec<ConfigValidationError>) {
        for (job_type, endpoint) in &config.endpoints {
            if let Err(e) = Url::parse(endpoint) {
                errors.push(ConfigValidationError::InvalidUrl {
                    url_type: format!("handler '{}'", job_type),
                    message: format!("{}: {}", endpoint, e),
                });
            }
        }
    }

    fn validate_observability(
        config: &crate::ObservabilityConfig,
        errors: &mut Vec<ConfigValidationError>,
    ) {
        let level = config.log_level.to_lowercase();
        if !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ConfigValidationError::InvalidLogLevel {
                value: config.log_level.clone(),
            });
        }
    }
}

/// Formats validation errors for display.
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    let mut output = String::from("Configuration validation failed:\n");
    for (i, error) in errors.iter().enumerate() {
        output.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    output
}
