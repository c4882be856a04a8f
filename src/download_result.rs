//! Downloading a package by URL into the global packages folder or a
//! direct-download file

use crate::context::PackageDownloadContext;
use crate::error::{FetchError, FetchResult};
use crate::global_packages::GlobalPackagesFolder;
use crate::http::{HttpSource, HttpSourceRequest};
use crate::version::PackageIdentity;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_ATTEMPTS: u32 = 3;

/// Extension of temporary direct-download files
pub const DIRECT_DOWNLOAD_EXTENSION: &str = "nugetdirectdownload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadResourceResultStatus {
    Available,
    NotFound,
    Cancelled,
}

/// A downloaded package, or why there is none.
///
/// Direct-download files are deleted when the result is dropped.
#[derive(Debug)]
pub struct DownloadResourceResult {
    status: DownloadResourceResultStatus,
    file: Option<File>,
    path: Option<PathBuf>,
    install_path: Option<PathBuf>,
    source: Option<String>,
    delete_on_drop: bool,
}

impl DownloadResourceResult {
    fn empty(status: DownloadResourceResultStatus) -> Self {
        Self {
            status,
            file: None,
            path: None,
            install_path: None,
            source: None,
            delete_on_drop: false,
        }
    }

    pub fn not_found() -> Self {
        Self::empty(DownloadResourceResultStatus::NotFound)
    }

    pub fn cancelled() -> Self {
        Self::empty(DownloadResourceResultStatus::Cancelled)
    }

    /// A package installed in the global packages folder
    pub fn from_global_folder(
        file: File,
        path: PathBuf,
        install_path: PathBuf,
        source: Option<String>,
    ) -> Self {
        Self {
            status: DownloadResourceResultStatus::Available,
            file: Some(file),
            path: Some(path),
            install_path: Some(install_path),
            source,
            delete_on_drop: false,
        }
    }

    /// A temporary direct-download file, removed on drop
    pub fn direct_download(file: File, path: PathBuf, source: Option<String>) -> Self {
        Self {
            status: DownloadResourceResultStatus::Available,
            file: Some(file),
            path: Some(path),
            install_path: None,
            source,
            delete_on_drop: true,
        }
    }

    pub fn status(&self) -> DownloadResourceResultStatus {
        self.status
    }

    pub fn is_available(&self) -> bool {
        self.status == DownloadResourceResultStatus::Available
    }

    /// The nupkg, opened read-only
    pub fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Package folder in the global packages folder
    pub fn install_path(&self) -> Option<&Path> {
        self.install_path.as_deref()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn is_direct_download(&self) -> bool {
        self.delete_on_drop
    }
}

impl Drop for DownloadResourceResult {
    fn drop(&mut self) {
        // close before deleting
        self.file.take();
        if self.delete_on_drop {
            if let Some(ref path) = self.path {
                if let Err(e) = fs::remove_file(path) {
                    debug!("Could not delete {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Download `identity` from `url`.
///
/// A complete install in the global packages folder is returned without a
/// request unless direct download is on. Otherwise the package is either
/// installed into the global packages folder or written to a temporary
/// direct-download file.
pub async fn get_download_result(
    http_source: &HttpSource,
    identity: &PackageIdentity,
    url: &str,
    download_ctx: &PackageDownloadContext<'_>,
    global_packages_folder: &Path,
    token: &CancellationToken,
) -> FetchResult<DownloadResourceResult> {
    let folder = GlobalPackagesFolder::new(global_packages_folder);
    if !download_ctx.direct_download() {
        if let Some(existing) = folder.get_package(identity)? {
            debug!("{} found in {}", identity, global_packages_folder.display());
            return Ok(existing);
        }
    }

    let mut last_error = None;
    for attempt in 1..=MAX_ATTEMPTS {
        if token.is_cancelled() {
            return Ok(DownloadResourceResult::cancelled());
        }

        let mut request = HttpSourceRequest::new(url, download_ctx.cache_context.session_id);
        request.ignore_not_found = true;
        request.max_tries = Some(1);
        request.is_retry = attempt > 1;
        request.is_last_attempt = attempt == MAX_ATTEMPTS;

        let result = match http_source.get_stream(&request, token).await {
            Ok(None) => return Ok(DownloadResourceResult::not_found()),
            Ok(Some(mut body)) => {
                if download_ctx.direct_download() {
                    write_direct_download(http_source.source(), &mut body, download_ctx, token).await
                } else {
                    folder
                        .add_package(
                            Some(http_source.source()),
                            identity,
                            &mut body,
                            download_ctx.parent_id,
                            token,
                        )
                        .await
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(result) => return Ok(result),
            Err(e) if e.is_cancelled() => return Ok(DownloadResourceResult::cancelled()),
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

async fn write_direct_download(
    source: &str,
    body: &mut crate::http::ResponseBody,
    download_ctx: &PackageDownloadContext<'_>,
    token: &CancellationToken,
) -> FetchResult<DownloadResourceResult> {
    let folder = download_ctx.direct_download_folder()?;
    tokio::fs::create_dir_all(&folder)
        .await
        .map_err(|e| FetchError::io(format!("creating {}", folder.display()), e))?;

    let path = folder.join(format!("{}.{}", Uuid::new_v4().simple(), DIRECT_DOWNLOAD_EXTENSION));
    let write = async {
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| FetchError::io(format!("creating {}", path.display()), e))?;
        tokio::io::copy(body, &mut file)
            .await
            .map_err(|e| FetchError::io(format!("writing {}", path.display()), e))?;
        file.flush()
            .await
            .map_err(|e| FetchError::io(format!("writing {}", path.display()), e))?;
        Ok::<_, FetchError>(())
    };

    let written = tokio::select! {
        _ = token.cancelled() => Err(FetchError::Cancelled),
        result = write => result,
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e);
    }

    let file = File::open(&path).map_err(|e| FetchError::io(format!("opening {}", path.display()), e))?;
    debug!("Direct download written to {}", path.display());
    Ok(DownloadResourceResult::direct_download(file, path, Some(source.to_string())))
}

/// Delete leftover direct-download files. Failures are ignored.
pub fn cleanup_direct_downloads(download_ctx: &PackageDownloadContext<'_>) {
    if !download_ctx.direct_download() {
        return;
    }

    let folder = match download_ctx.direct_download_directory {
        Some(ref dir) => dir.clone(),
        None => download_ctx.cache_context.generated_temp_folder().to_path_buf(),
    };
    let Ok(entries) = fs::read_dir(&folder) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_direct = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(DIRECT_DOWNLOAD_EXTENSION));
        if is_direct {
            if let Err(e) = fs::remove_file(&path) {
                debug!("Could not delete {}: {}", path.display(), e);
            }
        }
    }
}
