//! Shared command setup: config loading, logging, and opening the cache.

use std::path::{Path, PathBuf};

use pixcache::config::{config_file_path, ConfigFile};
use pixcache::logging::{default_log_dir, default_log_file, init_logging, LoggingGuard};
use pixcache::service::ImageCache;
use tracing::info;

use crate::error::CliError;

/// Owns what every cache command needs for its lifetime.
pub struct CliRunner {
    _logging_guard: LoggingGuard,
    config: ConfigFile,
    config_path: PathBuf,
}

impl CliRunner {
    /// Load the config (default location unless `config_path` is given)
    /// and start logging.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(config_file_path);
        let config = ConfigFile::load_from(&config_path)?;

        let logging_guard = init_logging(&default_log_dir(), default_log_file())
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            config_path,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn log_startup(&self, command: &str) {
        info!("pixcache v{}", pixcache::VERSION);
        info!(
            config = %self.config_path.display(),
            cache_dir = %self.config.cache.directory.display(),
            "{} command",
            command
        );
    }

    /// Open the cache described by the loaded config.
    pub async fn open_cache(&self) -> Result<ImageCache, CliError> {
        ImageCache::new(self.config.to_cache_config())
            .await
            .map_err(CliError::CacheOpen)
    }
}
