//! Nupkg download coordination
//!
//! `NupkgDownloader` guarantees at most one download in flight per URL.
//! Concurrent callers for the same URL await the same cell; a failed
//! download leaves the cell empty so the next caller tries again.

use crate::context::{HttpSourceCacheContext, SourceCacheContext};
use crate::diagnostics::ProtocolDiagnostics;
use crate::error::{FetchError, FetchResult};
use crate::http::{ContentValidation, HttpSource, HttpSourceCachedRequest, HttpSourceResult};
use crate::package::{read_nuspec_from_nupkg, NuspecReader};
use crate::version::PackageIdentity;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;

/// Outcome of a completed download
#[derive(Debug, Clone)]
struct NupkgEntry {
    /// `None` when the source answered 404
    path: Option<PathBuf>,
}

pub(crate) type Cells<T> = Mutex<HashMap<String, Arc<OnceCell<T>>>>;

/// Downloads nupkgs from one source, sharing work between callers
pub struct NupkgDownloader {
    http_source: Arc<HttpSource>,
    nupkgs: Cells<NupkgEntry>,
    nuspecs: Cells<Arc<NuspecReader>>,
}

impl NupkgDownloader {
    pub fn new(http_source: Arc<HttpSource>) -> Self {
        Self {
            http_source,
            nupkgs: Mutex::new(HashMap::new()),
            nuspecs: Mutex::new(HashMap::new()),
        }
    }

    pub fn http_source(&self) -> &Arc<HttpSource> {
        &self.http_source
    }

    /// Copy the nupkg at `url` into `dest`. Returns false if the source
    /// does not have it.
    pub async fn copy_nupkg_to<W>(
        &self,
        identity: &PackageIdentity,
        url: &str,
        dest: &mut W,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<bool>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let Some(path) = self.ensure_nupkg(identity, url, ctx, token).await?.path else {
            return Ok(false);
        };

        let copy = async {
            let mut file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| FetchError::io(format!("opening {}", path.display()), e))?;
            let copied = tokio::io::copy(&mut file, dest)
                .await
                .map_err(|e| FetchError::io(format!("copying {}", path.display()), e))?;
            dest.flush()
                .await
                .map_err(|e| FetchError::io("flushing nupkg destination", e))?;
            Ok::<_, FetchError>(copied)
        };

        let copied = tokio::select! {
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            result = copy => result?,
        };

        ProtocolDiagnostics::raise_nupkg_copied(self.http_source.source(), copied);
        Ok(true)
    }

    /// Nuspec of the nupkg at `url`, read once per URL
    pub async fn get_nuspec_reader(
        &self,
        identity: &PackageIdentity,
        url: &str,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<Arc<NuspecReader>> {
        let cell = cell_for(&self.nuspecs, url, ctx.refresh_memory_cache);
        let reader = cell
            .get_or_try_init(|| async {
                let entry = self.ensure_nupkg(identity, url, ctx, token).await?;
                let path = entry
                    .path
                    .ok_or_else(|| FetchError::PackageNotFound(identity.to_string()))?;
                let reader = tokio::task::spawn_blocking(move || read_nuspec_from_nupkg(&path))
                    .await
                    .map_err(|e| FetchError::Internal(format!("nuspec task failed: {}", e)))??;
                Ok::<_, FetchError>(Arc::new(reader))
            })
            .await?;
        Ok(reader.clone())
    }

    /// Local path of the downloaded nupkg, `None` if the source lacks it
    pub async fn nupkg_path(
        &self,
        identity: &PackageIdentity,
        url: &str,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<Option<PathBuf>> {
        Ok(self.ensure_nupkg(identity, url, ctx, token).await?.path)
    }

    async fn ensure_nupkg(
        &self,
        identity: &PackageIdentity,
        url: &str,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<NupkgEntry> {
        let mut refresh = ctx.refresh_memory_cache;
        let mut redownloaded = false;

        loop {
            let cell = cell_for(&self.nupkgs, url, refresh);
            let entry = cell
                .get_or_try_init(|| self.download(identity, url, ctx, token))
                .await?
                .clone();

            if let Some(ref path) = entry.path {
                let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
                if !exists && !redownloaded {
                    debug!("{} disappeared, downloading {} again", path.display(), url);
                    evict(&self.nupkgs, url, &cell);
                    refresh = false;
                    redownloaded = true;
                    continue;
                }
            }
            return Ok(entry);
        }
    }

    async fn download(
        &self,
        identity: &PackageIdentity,
        url: &str,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<NupkgEntry> {
        let cache_key = format!("nupkg_{}.{}", identity.id_lower(), identity.version_lower());
        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            if token.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let cache_context = HttpSourceCacheContext::create(ctx, attempt == 1)?;
            let mut request =
                HttpSourceCachedRequest::new(url, cache_key.as_str(), cache_context, ctx.session_id);
            request.ignore_not_found = true;
            request.validation = ContentValidation::Nupkg;
            request.is_retry = attempt > 1;
            request.is_last_attempt = attempt == MAX_ATTEMPTS;

            match self.http_source.get_cached(&request, token).await {
                Ok(HttpSourceResult::OpenedFromDisk { cache_file, .. }) => {
                    return Ok(NupkgEntry {
                        path: Some(cache_file),
                    })
                }
                Ok(HttpSourceResult::NotFound) | Ok(HttpSourceResult::NoContent) => {
                    debug!("  NOT FOUND {}", url);
                    return Ok(NupkgEntry { path: None });
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    if attempt < MAX_ATTEMPTS {
                        warn!("Retrying download of '{}' from '{}': {}", identity, url, e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(FetchError::PackageDownload {
            identity: identity.to_string(),
            url: url.to_string(),
            reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

/// Cell memoizing `url`, replaced with an empty one when `refresh` is set
pub(crate) fn cell_for<T>(cells: &Cells<T>, url: &str, refresh: bool) -> Arc<OnceCell<T>> {
    let mut map = cells.lock().unwrap_or_else(|e| e.into_inner());
    if refresh {
        let cell = Arc::new(OnceCell::new());
        map.insert(url.to_string(), cell.clone());
        return cell;
    }
    map.entry(url.to_string()).or_default().clone()
}

/// Drop `cell` unless another caller already replaced it
fn evict<T>(cells: &Cells<T>, url: &str, cell: &Arc<OnceCell<T>>) {
    let mut map = cells.lock().unwrap_or_else(|e| e.into_inner());
    if map.get(url).is_some_and(|current| Arc::ptr_eq(current, cell)) {
        map.remove(url);
    }
}
