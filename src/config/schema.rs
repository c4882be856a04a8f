//! Configuration schema for nuget-fetch
//!
//! Configuration is stored at `~/.config/nuget-fetch/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Flat container endpoint of nuget.org
pub const NUGET_ORG_FLAT_CONTAINER: &str = "https://api.nuget.org/v3-flatcontainer/";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache locations and policy
    pub cache: CacheConfig,

    /// HTTP request policy
    pub http: HttpConfig,

    /// Package sources, tried in order
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            cache: CacheConfig::default(),
            http: HttpConfig::default(),
            sources: vec![SourceConfig::default()],
        }
    }
}

impl Config {
    /// Base URLs of all configured sources
    pub fn source_urls(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.url.clone()).collect()
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Global packages folder (default: ~/.nuget/packages)
    pub global_packages_folder: Option<PathBuf>,

    /// HTTP cache directory (default: platform data dir)
    pub http_cache_dir: Option<PathBuf>,

    /// Seconds an HTTP cache entry stays fresh
    pub max_age_secs: u64,

    /// Bypass the global packages folder and HTTP cache for nupkgs
    pub direct_download: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            global_packages_folder: None,
            http_cache_dir: None,
            max_age_secs: 30 * 60,
            direct_download: false,
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Time allowed until response headers arrive
    pub request_timeout_secs: u64,

    /// Time allowed between two reads of a response body
    pub download_timeout_secs: u64,

    /// Attempts per request inside the retry handler
    pub max_tries: u32,

    /// Initial delay between attempts, doubled on each retry
    pub retry_delay_ms: u64,

    /// Maximum concurrent requests per source (0 = unlimited)
    pub max_concurrent_requests: usize,

    /// User-Agent header value
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 100,
            download_timeout_secs: 60,
            max_tries: 3,
            retry_delay_ms: 200,
            max_concurrent_requests: 0,
            user_agent: format!("nuget-fetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// A package source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Display name
    pub name: String,

    /// Flat container base URL
    pub url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "nuget.org".to_string(),
            url: NUGET_ORG_FLAT_CONTAINER.to_string(),
        }
    }
}
