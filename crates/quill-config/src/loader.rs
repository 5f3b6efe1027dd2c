//! Configuration loader with layered sources.

use crate::{format_validation_errors, AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use quill_core::QuillError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Environment variable selecting the environment overlay file.
pub const ENVIRONMENT_VAR: &str = "QUILL_ENVIRONMENT";

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `{config_dir}/default.toml` - Default values
    /// 2. `{config_dir}/{environment}.toml` - Environment-specific overrides
    /// 3. `{config_dir}/local.toml` - Local overrides
    /// 4. Environment variables with `QUILL__` prefix (`QUILL__QUEUE__LOCK_TTL_SECS`)
    ///
    /// Missing files are skipped. The merged result is validated before it
    /// is accepted.
    pub fn new(config_dir: impl AsRef<Path>) -> Result<Self, QuillError> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, QuillError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    ///
    /// An invalid configuration leaves the current one in place.
    pub async fn reload(&self) -> Result<(), QuillError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    fn load_config(config_dir: &Path) -> Result<AppConfig, QuillError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());

        info!(
            environment = %environment,
            config_dir = %config_dir.display(),
            "Loading configuration"
        );

        let mut builder = Config::builder()
            .set_default("app.environment", environment.as_str())
            .map_err(config_error_to_quill_error)?;

        for name in ["default", environment.as_str(), "local"] {
            let path = config_dir.join(format!("{name}.toml"));
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("QUILL")
                .separator("__")
                .try_parsing(true),
        );

        let app_config: AppConfig = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(config_error_to_quill_error)?;

        ConfigValidator::validate(&app_config)
            .map_err(|errors| QuillError::Configuration(format_validation_errors(&errors)))?;

        Ok(app_config)
    }
}

fn config_error_to_quill_error(err: ConfigError) -> QuillError {
    QuillError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunMode;
    use std::fs;

    #[tokio::test]
    async fn test_missing_dir_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().join("absent")).unwrap();
        let config = loader.get().await;
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.queue.default_priority, 5);
    }

    #[tokio::test]
    async fn test_layered_files_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[queue]\nmax_concurrent_jobs = 8\nretry_delay_secs = 5\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("local.toml"),
            "[queue]\nmax_concurrent_jobs = 2\n\n[app]\nmode = \"worker\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new(dir.path()).unwrap().get().await;
        assert_eq!(config.queue.max_concurrent_jobs, 2);
        assert_eq!(config.queue.retry_delay_secs, 5);
        assert_eq!(config.queue.lock_ttl_secs, 600);
        assert_eq!(config.app.mode, RunMode::Worker);
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[queue]\ndefault_priority = 0\n",
        )
        .unwrap();

        let err = ConfigLoader::new(dir.path()).err().unwrap();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
        assert!(err.to_string().contains("queue.default_priority"));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.toml");
        fs::write(&path, "[worker]\nconcurrency = 2\n").unwrap();

        let loader = ConfigLoader::new(dir.path()).unwrap();
        assert_eq!(loader.get().await.worker.concurrency, 2);

        fs::write(&path, "[worker]\nconcurrency = 4\n").unwrap();
        loader.reload().await.unwrap();
        assert_eq!(loader.get().await.worker.concurrency, 4);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.toml");
        fs::write(&path, "[worker]\nconcurrency = 3\n").unwrap();

        let loader = ConfigLoader::new(dir.path()).unwrap();
        fs::write(&path, "[worker]\nconcurrency = 0\n").unwrap();
        assert!(loader.reload().await.is_err());
        assert_eq!(loader.get().await.worker.concurrency, 3);
    }
}
