//! Environment overrides
//!
//! Lookups take a `name -> Option<String>` function so callers can inject
//! a fake environment.

use super::Config;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub const NUGET_PACKAGES: &str = "NUGET_PACKAGES";
pub const NUGET_HTTP_CACHE_PATH: &str = "NUGET_HTTP_CACHE_PATH";
pub const ENABLE_ENHANCED_HTTP_RETRY: &str = "NUGET_ENABLE_ENHANCED_HTTP_RETRY";
pub const ENHANCED_MAX_NETWORK_TRY_COUNT: &str = "NUGET_ENHANCED_MAX_NETWORK_TRY_COUNT";
pub const ENHANCED_NETWORK_RETRY_DELAY_MS: &str = "NUGET_ENHANCED_NETWORK_RETRY_DELAY_MILLISECONDS";
pub const RETRY_HTTP_429: &str = "NUGET_RETRY_HTTP_429";

pub const DEFAULT_ENHANCED_MAX_TRIES: u32 = 6;
pub const DEFAULT_ENHANCED_RETRY_DELAY_MS: u64 = 1000;

pub(crate) fn global_packages_folder<F>(config: &Config, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = non_empty(lookup(NUGET_PACKAGES)) {
        debug!("Using global packages folder from {}", NUGET_PACKAGES);
        return PathBuf::from(path);
    }
    if let Some(ref path) = config.cache.global_packages_folder {
        return path.clone();
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nuget")
        .join("packages")
}

pub(crate) fn http_cache_dir<F>(config: &Config, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = non_empty(lookup(NUGET_HTTP_CACHE_PATH)) {
        debug!("Using HTTP cache from {}", NUGET_HTTP_CACHE_PATH);
        return PathBuf::from(path);
    }
    if let Some(ref path) = config.cache.http_cache_dir {
        return path.clone();
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("NuGet")
        .join("v3-cache")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Retry policy overrides read from the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhancedRetrySettings {
    /// Whether the overrides below apply at all
    pub enabled: bool,
    /// Attempts per request, overriding `http.max_tries` when enabled
    pub max_tries: Option<u32>,
    /// Delay between attempts, overriding `http.retry_delay_ms` when enabled
    pub retry_delay: Option<Duration>,
    /// Treat 429 Too Many Requests as retryable
    pub retry_429: bool,
}

impl Default for EnhancedRetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tries: Some(DEFAULT_ENHANCED_MAX_TRIES),
            retry_delay: Some(Duration::from_millis(DEFAULT_ENHANCED_RETRY_DELAY_MS)),
            retry_429: true,
        }
    }
}

impl EnhancedRetrySettings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Effective attempts per request given the configured value
    pub fn effective_max_tries(&self, configured: u32) -> u32 {
        match self.max_tries {
            Some(n) if self.enabled => n,
            _ => configured,
        }
    }

    /// Effective delay between attempts given the configured value
    pub fn effective_retry_delay(&self, configured: Duration) -> Duration {
        match self.retry_delay {
            Some(d) if self.enabled => d,
            _ => configured,
        }
    }

    /// Read settings through `lookup`; unparsable values keep their default
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            enabled: parse_bool(lookup(ENABLE_ENHANCED_HTTP_RETRY)).unwrap_or(defaults.enabled),
            max_tries: lookup(ENHANCED_MAX_NETWORK_TRY_COUNT)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|n| *n > 0)
                .or(defaults.max_tries),
            retry_delay: lookup(ENHANCED_NETWORK_RETRY_DELAY_MS)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .or(defaults.retry_delay),
            retry_429: parse_bool(lookup(RETRY_HTTP_429)).unwrap_or(defaults.retry_429),
        }
    }
}

fn parse_bool(value: Option<String>) -> Option<bool> {
    match value?.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn env_overrides_global_packages_folder() {
        let mut config = Config::default();
        config.cache.global_packages_folder = Some(PathBuf::from("/from/config"));

        let path = global_packages_folder(&config, env(&[(NUGET_PACKAGES, "/from/env")]));
        assert_eq!(path, PathBuf::from("/from/env"));

        let path = global_packages_folder(&config, env(&[]));
        assert_eq!(path, PathBuf::from("/from/config"));
    }

    #[test]
    fn blank_env_value_is_ignored() {
        let mut config = Config::default();
        config.cache.http_cache_dir = Some(PathBuf::from("/cfg/http"));
        let path = http_cache_dir(&config, env(&[(NUGET_HTTP_CACHE_PATH, "  ")]));
        assert_eq!(path, PathBuf::from("/cfg/http"));
    }

    #[test]
    fn enhanced_retry_defaults() {
        let settings = EnhancedRetrySettings::from_lookup(env(&[]));
        assert!(settings.enabled);
        assert!(settings.retry_429);
        assert_eq!(settings.effective_max_tries(3), 6);
        assert_eq!(
            settings.effective_retry_delay(Duration::from_millis(200)),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn enhanced_retry_reads_values() {
        let settings = EnhancedRetrySettings::from_lookup(env(&[
            (ENABLE_ENHANCED_HTTP_RETRY, "false"),
            (ENHANCED_MAX_NETWORK_TRY_COUNT, "9"),
            (ENHANCED_NETWORK_RETRY_DELAY_MS, "25"),
            (RETRY_HTTP_429, "0"),
        ]));
        assert!(!settings.enabled);
        assert_eq!(settings.max_tries, Some(9));
        assert_eq!(settings.retry_delay, Some(Duration::from_millis(25)));
        assert!(!settings.retry_429);
        // disabled: configured values win
        assert_eq!(settings.effective_max_tries(3), 3);
    }

    #[test]
    fn enhanced_retry_invalid_values_fall_back() {
        let settings = EnhancedRetrySettings::from_lookup(env(&[
            (ENABLE_ENHANCED_HTTP_RETRY, "maybe"),
            (ENHANCED_MAX_NETWORK_TRY_COUNT, "0"),
            (ENHANCED_NETWORK_RETRY_DELAY_MS, "-5"),
        ]));
        assert!(settings.enabled);
        assert_eq!(settings.max_tries, Some(DEFAULT_ENHANCED_MAX_TRIES));
        assert_eq!(settings.retry_delay, Some(Duration::from_millis(DEFAULT_ENHANCED_RETRY_DELAY_MS)));
        assert_eq!(settings.effective_max_tries(3), 6);
    }

    #[test]
    fn enhanced_retry_overrides_when_enabled() {
        let settings = EnhancedRetrySettings::from_lookup(env(&[
            (ENHANCED_MAX_NETWORK_TRY_COUNT, "4"),
            (ENHANCED_NETWORK_RETRY_DELAY_MS, "50"),
        ]));
        assert_eq!(settings.effective_max_tries(3), 4);
        assert_eq!(
            settings.effective_retry_delay(Duration::from_millis(200)),
            Duration::from_millis(50)
        );
    }
}
