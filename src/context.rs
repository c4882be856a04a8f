//! Per-operation cache policy
//!
//! `SourceCacheContext` is created once per logical operation (a restore,
//! a CLI invocation) and shared by reference with every resource that
//! touches the caches.

use crate::config::{Config, ConfigManager};
use crate::error::{FetchError, FetchResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Default freshness window for HTTP cache entries
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Cache policy and session state for one logical operation
#[derive(Debug)]
pub struct SourceCacheContext {
    /// Ignore fresh HTTP cache entries and fetch again
    pub no_cache: bool,
    /// Download nupkgs into the session temp folder only
    pub direct_download: bool,
    /// Replace in-memory entries instead of reusing them
    pub refresh_memory_cache: bool,
    /// Sent as `X-NuGet-Session-Id` on every request
    pub session_id: Uuid,
    max_age: Duration,
    generated_temp_folder: PathBuf,
    temp_folder_created: AtomicBool,
}

impl SourceCacheContext {
    pub fn new() -> Self {
        Self::with_scratch_dir(ConfigManager::scratch_dir())
    }

    /// Context whose session temp folder lives under `scratch`
    pub fn with_scratch_dir(scratch: impl AsRef<Path>) -> Self {
        let session_id = Uuid::new_v4();
        Self {
            no_cache: false,
            direct_download: false,
            refresh_memory_cache: false,
            session_id,
            max_age: DEFAULT_MAX_AGE,
            generated_temp_folder: scratch.as_ref().join(session_id.simple().to_string()),
            temp_folder_created: AtomicBool::new(false),
        }
    }

    /// Context configured from the `[cache]` section
    pub fn from_config(config: &Config) -> Self {
        let mut ctx = Self::new();
        ctx.max_age = config.cache.max_age();
        ctx.direct_download = config.cache.direct_download;
        ctx
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    pub fn with_direct_download(mut self, direct_download: bool) -> Self {
        self.direct_download = direct_download;
        self
    }

    pub fn with_refresh_memory_cache(mut self, refresh: bool) -> Self {
        self.refresh_memory_cache = refresh;
        self
    }

    /// Effective freshness window; zero when `no_cache` is set
    pub fn max_age(&self) -> Duration {
        if self.no_cache {
            Duration::ZERO
        } else {
            self.max_age
        }
    }

    /// Session temp folder path; may not exist yet
    pub fn generated_temp_folder(&self) -> &Path {
        &self.generated_temp_folder
    }

    /// Create the session temp folder if needed and return it
    pub fn ensure_temp_folder(&self) -> FetchResult<&Path> {
        std::fs::create_dir_all(&self.generated_temp_folder).map_err(|e| {
            FetchError::io(
                format!("creating temp folder {}", self.generated_temp_folder.display()),
                e,
            )
        })?;
        self.temp_folder_created.store(true, Ordering::SeqCst);
        Ok(&self.generated_temp_folder)
    }
}

impl Default for SourceCacheContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SourceCacheContext {
    fn drop(&mut self) {
        if self.temp_folder_created.load(Ordering::SeqCst) {
            debug!("Removing session temp folder {}", self.generated_temp_folder.display());
            let _ = std::fs::remove_dir_all(&self.generated_temp_folder);
        }
    }
}

/// Where one HTTP attempt may read and write its cache file
#[derive(Debug, Clone)]
pub struct HttpSourceCacheContext {
    /// Entries older than this are refetched; zero always refetches
    pub max_age: Duration,
    /// Session temp folder used when the HTTP cache is bypassed
    pub root_temp_folder: Option<PathBuf>,
}

impl HttpSourceCacheContext {
    /// Policy for one attempt.
    ///
    /// Direct downloads always go to an ephemeral file in the session temp
    /// folder. Retries refetch and overwrite the HTTP cache entry.
    pub fn create(ctx: &SourceCacheContext, is_first_attempt: bool) -> FetchResult<Self> {
        if ctx.direct_download {
            return Ok(Self {
                max_age: Duration::ZERO,
                root_temp_folder: Some(ctx.ensure_temp_folder()?.to_path_buf()),
            });
        }

        let max_age = if is_first_attempt {
            ctx.max_age()
        } else {
            Duration::ZERO
        };
        Ok(Self {
            max_age,
            root_temp_folder: None,
        })
    }
}

/// Options for downloading a package into a destination
#[derive(Debug)]
pub struct PackageDownloadContext<'a> {
    pub cache_context: &'a SourceCacheContext,
    /// Folder for direct-download files; defaults to the session temp folder
    pub direct_download_directory: Option<PathBuf>,
    /// Correlates the download with a parent operation in logs
    pub parent_id: Uuid,
}

impl<'a> PackageDownloadContext<'a> {
    pub fn new(cache_context: &'a SourceCacheContext) -> Self {
        Self {
            cache_context,
            direct_download_directory: None,
            parent_id: Uuid::new_v4(),
        }
    }

    pub fn with_direct_download_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.direct_download_directory = Some(dir.into());
        self
    }

    pub fn direct_download(&self) -> bool {
        self.cache_context.direct_download
    }

    /// Folder direct downloads are written to
    pub fn direct_download_folder(&self) -> FetchResult<PathBuf> {
        match self.direct_download_directory {
            Some(ref dir) => Ok(dir.clone()),
            None => Ok(self.cache_context.ensure_temp_folder()?.to_path_buf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn no_cache_zeroes_max_age() {
        let temp = TempDir::new().unwrap();
        let ctx = SourceCacheContext::with_scratch_dir(temp.path());
        assert_eq!(ctx.max_age(), DEFAULT_MAX_AGE);

        let ctx = ctx.with_no_cache(true);
        assert_eq!(ctx.max_age(), Duration::ZERO);
    }

    #[test]
    fn http_context_per_attempt() {
        let temp = TempDir::new().unwrap();
        let ctx = SourceCacheContext::with_scratch_dir(temp.path()).with_max_age(Duration::from_secs(5));

        let first = HttpSourceCacheContext::create(&ctx, true).unwrap();
        assert_eq!(first.max_age, Duration::from_secs(5));
        assert!(first.root_temp_folder.is_none());

        let retry = HttpSourceCacheContext::create(&ctx, false).unwrap();
        assert_eq!(retry.max_age, Duration::ZERO);
        assert!(retry.root_temp_folder.is_none());
    }

    #[test]
    fn direct_download_uses_session_folder() {
        let temp = TempDir::new().unwrap();
        let ctx = SourceCacheContext::with_scratch_dir(temp.path()).with_direct_download(true);

        let http = HttpSourceCacheContext::create(&ctx, true).unwrap();
        assert_eq!(http.max_age, Duration::ZERO);
        let folder = http.root_temp_folder.unwrap();
        assert!(folder.is_dir());
        assert!(folder.starts_with(temp.path()));
    }

    #[test]
    fn temp_folder_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let folder = {
            let ctx = SourceCacheContext::with_scratch_dir(temp.path());
            let folder = ctx.ensure_temp_folder().unwrap().to_path_buf();
            std::fs::write(folder.join("x.tmp"), b"x").unwrap();
            folder
        };
        assert!(!folder.exists());
    }

    #[test]
    fn download_context_defaults_to_session_folder() {
        let temp = TempDir::new().unwrap();
        let ctx = SourceCacheContext::with_scratch_dir(temp.path());
        let download = PackageDownloadContext::new(&ctx);
        assert_eq!(download.direct_download_folder().unwrap(), ctx.generated_temp_folder());

        let download = PackageDownloadContext::new(&ctx).with_direct_download_directory(temp.path().join("dd"));
        assert_eq!(download.direct_download_folder().unwrap(), temp.path().join("dd"));
    }
}
