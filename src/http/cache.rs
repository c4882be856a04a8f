//! On-disk HTTP cache entries
//!
//! Entries live at `<cache>/<fingerprint(source)>/<key>.dat`. A response is
//! written to `<key>.dat-new`, validated, then renamed over the entry so
//! readers never observe a partial file.

use super::transport::ResponseBody;
use super::validation::ContentValidation;
use crate::caching::{compute_hash, remove_invalid_file_name_chars};
use crate::context::HttpSourceCacheContext;
use crate::error::{FetchError, FetchResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Paths for one cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCacheResult {
    pub max_age: Duration,
    pub new_file: PathBuf,
    pub cache_file: PathBuf,
}

impl HttpCacheResult {
    /// Resolve the entry for `cache_key` of `source`.
    ///
    /// When the context supplies a temp folder the entry is a fresh random
    /// file there and the HTTP cache is not touched.
    pub fn initialize(
        http_cache_dir: &Path,
        source: &str,
        cache_key: &str,
        ctx: &HttpSourceCacheContext,
    ) -> Self {
        if let Some(ref folder) = ctx.root_temp_folder {
            let file = folder.join(Uuid::new_v4().simple().to_string());
            return Self {
                max_age: Duration::ZERO,
                new_file: file.clone(),
                cache_file: file,
            };
        }

        let folder = http_cache_dir.join(compute_hash(source, true));
        let cache_file = folder.join(format!("{}.dat", remove_invalid_file_name_chars(cache_key)));
        let mut new_file = cache_file.clone().into_os_string();
        new_file.push("-new");

        Self {
            max_age: ctx.max_age,
            new_file: PathBuf::from(new_file),
            cache_file,
        }
    }

    /// Stream `body` into the entry, validate it and open the result
    pub async fn create_cache_file(
        &self,
        url: &str,
        mut body: ResponseBody,
        validation: ContentValidation,
        token: &CancellationToken,
    ) -> FetchResult<File> {
        if let Some(parent) = self.new_file.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(format!("creating cache folder {}", parent.display()), e))?;
        }

        let write = async {
            let mut file = File::create(&self.new_file).await.map_err(|e| {
                FetchError::io(format!("creating {}", self.new_file.display()), e)
            })?;
            tokio::io::copy(&mut body, &mut file)
                .await
                .map_err(|e| FetchError::io(format!("downloading {}", url), e))?;
            file.flush()
                .await
                .map_err(|e| FetchError::io(format!("writing {}", self.new_file.display()), e))?;
            Ok::<_, FetchError>(())
        };

        let written = tokio::select! {
            _ = token.cancelled() => Err(FetchError::Cancelled),
            result = write => result,
        };

        if let Err(e) = written {
            let _ = fs::remove_file(&self.new_file).await;
            return Err(e);
        }

        if let Err(e) = validation.validate_file(url, &self.new_file).await {
            let _ = fs::remove_file(&self.new_file).await;
            return Err(e);
        }

        if self.new_file != self.cache_file {
            if fs::try_exists(&self.cache_file).await.unwrap_or(false) {
                fs::remove_file(&self.cache_file).await.map_err(|e| {
                    FetchError::io(format!("replacing {}", self.cache_file.display()), e)
                })?;
            }
            fs::rename(&self.new_file, &self.cache_file).await.map_err(|e| {
                FetchError::io(format!("moving {} into place", self.new_file.display()), e)
            })?;
        }

        debug!("Cached {} at {}", url, self.cache_file.display());
        File::open(&self.cache_file)
            .await
            .map_err(|e| FetchError::io(format!("opening {}", self.cache_file.display()), e))
    }
}
