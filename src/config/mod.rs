//! Configuration management for nuget-fetch

pub mod env;
pub mod schema;

pub use env::EnhancedRetrySettings;
pub use schema::Config;

use crate::error::{FetchError, FetchResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nuget-fetch")
            .join("config.toml")
    }

    /// Resolve the global packages folder.
    ///
    /// `NUGET_PACKAGES` wins over the config file, which wins over `~/.nuget/packages`.
    pub fn global_packages_folder(config: &Config) -> PathBuf {
        env::global_packages_folder(config, |name| std::env::var(name).ok())
    }

    /// Resolve the HTTP cache directory.
    ///
    /// `NUGET_HTTP_CACHE_PATH` wins over the config file.
    pub fn http_cache_dir(config: &Config) -> PathBuf {
        env::http_cache_dir(config, |name| std::env::var(name).ok())
    }

    /// Scratch directory for per-session temp folders and lock files
    pub fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join("NuGetScratch")
    }

    /// Load configuration, returning defaults if the file does not exist
    pub async fn load(&self) -> FetchResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> FetchResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| FetchError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| FetchError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> FetchResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            FetchError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> FetchResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
