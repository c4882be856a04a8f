//! Error types for nuget-fetch
//!
//! All modules use `FetchResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nuget-fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// All errors that can occur while fetching and caching packages
#[derive(Error, Debug)]
pub enum FetchError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // HTTP errors
    #[error("HTTP request to '{url}' failed: {reason}")]
    Http { url: String, reason: String },

    #[error("Response status code does not indicate success: {status} ({url})")]
    HttpStatus { url: String, status: u16 },

    #[error("{0}")]
    Timeout(String),

    #[error("The operation was cancelled")]
    Cancelled,

    #[error("The HTTP response from '{url}' is not valid: {reason}")]
    InvalidContent { url: String, reason: String },

    #[error("Remote source error: {0}")]
    Protocol(String),

    // Package errors
    #[error("Invalid package {path}: {reason}")]
    InvalidPackage { path: PathBuf, reason: String },

    #[error("Invalid nuspec: {0}")]
    InvalidNuspec(String),

    #[error("'{0}' is not a valid version string")]
    InvalidVersion(String),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Error downloading '{identity}' from '{url}': {reason}")]
    PackageDownload {
        identity: String,
        url: String,
        reason: String,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Invalid path: {path}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl FetchError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a transport-level HTTP error
    pub fn http(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid package error
    pub fn invalid_package(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPackage {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if the operation was cancelled by the caller
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Timeout(_) | Self::InvalidContent { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout(_) => Some("Increase http.request_timeout_secs or check your network"),
            Self::HttpStatus { status: 401, .. } | Self::HttpStatus { status: 403, .. } => {
                Some("The source requires credentials, which are not supported")
            }
            Self::ConfigInvalid { .. } => Some("Run: nuget-fetch config init --force"),
            Self::InvalidContent { .. } => Some("Retry with --no-cache to bypass the HTTP cache"),
            Self::PackageNotFound(_) => Some("Run: nuget-fetch versions <id> to list published versions"),
            _ => None,
        }
    }
}
