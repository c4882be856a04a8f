//! Flat-container package resource
//!
//! Lists versions from `<base>/<id>/index.json` and downloads nupkgs from
//! `<base>/<id>/<version>/<id>.<version>.nupkg`, with all ids and versions
//! lower-cased.

use crate::config::EnhancedRetrySettings;
use crate::context::{HttpSourceCacheContext, SourceCacheContext};
use crate::diagnostics::ProtocolDiagnostics;
use crate::downloader::{cell_for, Cells, NupkgDownloader};
use crate::error::{FetchError, FetchResult};
use crate::http::{HttpSource, HttpSourceCachedRequest};
use crate::package::DependencyGroup;
use crate::version::{NuGetVersion, PackageIdentity};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tries per base URI unless enhanced retry overrides it
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base URIs beyond this count are ignored
const MAX_BASE_URIS: usize = 3;

const RESOURCE_TYPE: &str = "RemoteFindPackageByIdResource";

/// One listed version and where to download it
#[derive(Debug, Clone)]
pub struct RemotePackageInfo {
    pub identity: PackageIdentity,
    pub content_uri: String,
}

type Listing = Arc<BTreeMap<NuGetVersion, RemotePackageInfo>>;

/// Dependency information read from a package's nuspec
#[derive(Debug, Clone, Serialize)]
pub struct DependencyInfo {
    pub id: String,
    pub version: String,
    pub dependency_groups: Vec<DependencyGroup>,
}

pub struct RemoteFindPackageByIdResource {
    base_uris: Vec<String>,
    http_source: Arc<HttpSource>,
    downloader: NupkgDownloader,
    max_retries: u32,
    listings: Cells<Listing>,
}

impl RemoteFindPackageByIdResource {
    /// Resource over `base_uris` (flat-container roots) fetched through
    /// `http_source`.
    pub fn new(base_uris: &[String], http_source: Arc<HttpSource>) -> FetchResult<Self> {
        let base_uris: Vec<String> = base_uris
            .iter()
            .take(MAX_BASE_URIS)
            .map(|uri| {
                if uri.ends_with('/') {
                    uri.clone()
                } else {
                    format!("{}/", uri)
                }
            })
            .collect();

        if base_uris.is_empty() {
            return Err(FetchError::User("at least one base URI is required".to_string()));
        }

        Ok(Self {
            base_uris,
            downloader: NupkgDownloader::new(http_source.clone()),
            http_source,
            max_retries: DEFAULT_MAX_RETRIES,
            listings: Mutex::new(HashMap::new()),
        })
    }

    /// Use the enhanced retry count when it is enabled
    pub fn with_retry_settings(mut self, retry: &EnhancedRetrySettings) -> Self {
        self.max_retries = retry.effective_max_tries(DEFAULT_MAX_RETRIES).max(1);
        self
    }

    pub fn base_uris(&self) -> &[String] {
        &self.base_uris
    }

    pub fn source(&self) -> &str {
        self.http_source.source()
    }

    pub fn downloader(&self) -> &NupkgDownloader {
        &self.downloader
    }

    /// All versions of `id`, ascending. Empty when the source lacks it.
    pub async fn get_all_versions(
        &self,
        id: &str,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<Vec<NuGetVersion>> {
        self.timed("get_all_versions", async {
            let listing = self.ensure_packages(id, ctx, token).await?;
            Ok(listing.keys().cloned().collect())
        })
        .await
    }

    /// Dependency groups of `id` `version`, `None` if it is not listed
    pub async fn get_dependency_info(
        &self,
        id: &str,
        version: &NuGetVersion,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<Option<DependencyInfo>> {
        self.timed("get_dependency_info", async {
            let listing = self.ensure_packages(id, ctx, token).await?;
            let Some(info) = listing.get(version) else {
                return Ok(None);
            };

            let reader = self
                .downloader
                .get_nuspec_reader(&info.identity, &info.content_uri, ctx, token)
                .await?;
            Ok(Some(DependencyInfo {
                id: reader.id.clone(),
                version: reader.version.to_normalized_string(),
                dependency_groups: reader.dependency_groups.clone(),
            }))
        })
        .await
    }

    /// Copy the nupkg into `dest`. Returns false if it is not listed.
    pub async fn copy_nupkg_to<W>(
        &self,
        id: &str,
        version: &NuGetVersion,
        dest: &mut W,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<bool>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.timed("copy_nupkg_to", async {
            let listing = self.ensure_packages(id, ctx, token).await?;
            match listing.get(version) {
                Some(info) => {
                    self.downloader
                        .copy_nupkg_to(&info.identity, &info.content_uri, dest, ctx, token)
                        .await
                }
                None => Ok(false),
            }
        })
        .await
    }

    /// Local path of the downloaded nupkg, `None` if it is not listed
    pub async fn nupkg_path(
        &self,
        identity: &PackageIdentity,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<Option<PathBuf>> {
        self.timed("nupkg_path", async {
            let listing = self.ensure_packages(&identity.id, ctx, token).await?;
            match listing.get(&identity.version) {
                Some(info) => {
                    self.downloader
                        .nupkg_path(&info.identity, &info.content_uri, ctx, token)
                        .await
                }
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn does_package_exist(
        &self,
        id: &str,
        version: &NuGetVersion,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<bool> {
        self.timed("does_package_exist", async {
            let listing = self.ensure_packages(id, ctx, token).await?;
            Ok(listing.contains_key(version))
        })
        .await
    }

    /// Content URL of a listed package
    pub async fn get_package_url(
        &self,
        id: &str,
        version: &NuGetVersion,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<Option<String>> {
        self.timed("get_package_url", async {
            let listing = self.ensure_packages(id, ctx, token).await?;
            Ok(listing.get(version).map(|info| info.content_uri.clone()))
        })
        .await
    }

    async fn timed<T, Fut>(&self, method: &str, operation: Fut) -> FetchResult<T>
    where
        Fut: Future<Output = FetchResult<T>>,
    {
        let started = Instant::now();
        let result = operation.await;
        ProtocolDiagnostics::raise_resource(self.source(), RESOURCE_TYPE, method, started.elapsed());
        result
    }

    async fn ensure_packages(
        &self,
        id: &str,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<Listing> {
        if token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let id_lower = id.to_lowercase();
        let cell = cell_for(&self.listings, &id_lower, ctx.refresh_memory_cache);
        let listing = cell
            .get_or_try_init(|| async {
                let listing = self.find_packages_by_id(id, ctx, token).await?;
                Ok::<_, FetchError>(Arc::new(listing))
            })
            .await?;
        Ok(listing.clone())
    }

    async fn find_packages_by_id(
        &self,
        id: &str,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<BTreeMap<NuGetVersion, RemotePackageInfo>> {
        let id_lower = id.to_lowercase();
        let count = self.base_uris.len() as u32;
        let max_tries = self.max_retries * count;

        for attempt in 1..=max_tries {
            let base_uri = &self.base_uris[((attempt - 1) % count) as usize];
            let uri = format!("{}{}/index.json", base_uri, id_lower);

            let cache_context = HttpSourceCacheContext::create(ctx, attempt == 1)?;
            let mut request =
                HttpSourceCachedRequest::new(&uri, format!("list_{}", id_lower), cache_context, ctx.session_id);
            request.ignore_not_found = true;
            // the outer loop owns retries
            request.max_tries = Some(1);
            request.is_retry = attempt > 1;
            request.is_last_attempt = attempt == max_tries;

            let result = match self.http_source.get_json(&request, token).await {
                Ok(Some(doc)) => consume_flat_container_index(&doc, id, base_uri),
                Ok(None) => Ok(BTreeMap::new()),
                Err(e) => Err(e),
            };

            match result {
                Ok(listing) => return Ok(listing),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if attempt < max_tries => {
                    info!("Retrying listing of '{}' from '{}': {}", id, uri, e);
                }
                Err(e) => {
                    warn!("Listing of '{}' from '{}' failed: {}", id, uri, e);
                    return Err(FetchError::Protocol(format!(
                        "Failed to retrieve information about '{}' from remote source '{}'.",
                        id, base_uri
                    )));
                }
            }
        }

        Err(FetchError::Internal("listing loop ended without a result".to_string()))
    }
}

/// Content URL for `id` `version` under `base_uri`
pub fn package_content_uri(base_uri: &str, id: &str, version: &NuGetVersion) -> String {
    let id_lower = id.to_lowercase();
    let version_lower = version.to_normalized_string().to_lowercase();
    format!("{base_uri}{id_lower}/{version_lower}/{id_lower}.{version_lower}.nupkg")
}

fn consume_flat_container_index(
    doc: &serde_json::Value,
    id: &str,
    base_uri: &str,
) -> FetchResult<BTreeMap<NuGetVersion, RemotePackageInfo>> {
    let mut listing = BTreeMap::new();
    let Some(versions) = doc.get("versions").and_then(|v| v.as_array()) else {
        return Ok(listing);
    };

    for value in versions {
        let text = value
            .as_str()
            .ok_or_else(|| FetchError::Protocol(format!("non-string version in listing of '{}'", id)))?;
        let version = NuGetVersion::parse(text)?;
        listing.entry(version.clone()).or_insert_with(|| RemotePackageInfo {
            content_uri: package_content_uri(base_uri, id, &version),
            identity: PackageIdentity::new(id, version),
        });
    }
    Ok(listing)
}
