//! Content checks applied before a response is committed to the cache

use crate::error::{FetchError, FetchResult};
use crate::package;
use std::path::Path;

/// How a downloaded file is validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentValidation {
    #[default]
    None,
    /// Body must parse as a JSON object
    JsonObject,
    /// Body must be a zip with a root nuspec
    Nupkg,
}

impl ContentValidation {
    /// Validate the file at `path`, downloaded from `url`
    pub async fn validate_file(self, url: &str, path: &Path) -> FetchResult<()> {
        match self {
            Self::None => Ok(()),
            Self::JsonObject => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| FetchError::io(format!("reading {}", path.display()), e))?;
                validate_json_object(url, &bytes)
            }
            Self::Nupkg => {
                let owned = path.to_path_buf();
                let result = tokio::task::spawn_blocking(move || package::validate_nupkg(&owned))
                    .await
                    .map_err(|e| FetchError::Internal(format!("validation task failed: {}", e)))?;
                result.map_err(|e| FetchError::InvalidContent {
                    url: url.to_string(),
                    reason: format!("not a valid nupkg: {}", e),
                })
            }
        }
    }
}

/// Fails unless `bytes` is a JSON object
pub fn validate_json_object(url: &str, bytes: &[u8]) -> FetchResult<()> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| FetchError::InvalidContent {
            url: url.to_string(),
            reason: format!("invalid JSON: {}", e),
        })?;

    if !value.is_object() {
        return Err(FetchError::InvalidContent {
            url: url.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    }
    Ok(())
}
