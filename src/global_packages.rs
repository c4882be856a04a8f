//! Global packages folder
//!
//! Layout, all lower case:
//! `<root>/<id>/<version>/{<id>.<version>.nupkg, <id>.<version>.nupkg.sha512, <id>.nuspec, .nupkg.metadata, ...}`.
//! `.nupkg.metadata` is written last; a folder without it is an
//! interrupted install and is replaced on the next add.

use crate::concurrency;
use crate::context::SourceCacheContext;
use crate::download_result::DownloadResourceResult;
use crate::error::{FetchError, FetchResult};
use crate::package::{compute_content_hash, extract_nuspec, extract_package_files};
use crate::remote::RemoteFindPackageByIdResource;
use crate::version::PackageIdentity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const NUPKG_METADATA_FILE: &str = ".nupkg.metadata";
const NUPKG_METADATA_VERSION: u32 = 2;

/// Paths inside the global packages folder
#[derive(Debug, Clone)]
pub struct VersionFolderPathResolver {
    root: PathBuf,
}

impl VersionFolderPathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Folder holding every installed version of `id`
    pub fn version_list_path(&self, id: &str) -> PathBuf {
        self.root.join(id.to_lowercase())
    }

    pub fn install_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.version_list_path(&identity.id).join(identity.version_lower())
    }

    pub fn package_file_name(&self, identity: &PackageIdentity) -> String {
        format!("{}.{}.nupkg", identity.id_lower(), identity.version_lower())
    }

    pub fn package_file_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.install_path(identity).join(self.package_file_name(identity))
    }

    pub fn manifest_file_name(&self, identity: &PackageIdentity) -> String {
        format!("{}.nuspec", identity.id_lower())
    }

    pub fn manifest_file_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.install_path(identity).join(self.manifest_file_name(identity))
    }

    pub fn hash_file_name(&self, identity: &PackageIdentity) -> String {
        format!("{}.sha512", self.package_file_name(identity))
    }

    pub fn hash_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.install_path(identity).join(self.hash_file_name(identity))
    }

    pub fn nupkg_metadata_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.install_path(identity).join(NUPKG_METADATA_FILE)
    }
}

/// Contents of `.nupkg.metadata`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NupkgMetadataFile {
    pub version: u32,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl NupkgMetadataFile {
    pub fn new(content_hash: impl Into<String>, source: Option<String>) -> Self {
        Self {
            version: NUPKG_METADATA_VERSION,
            content_hash: content_hash.into(),
            source,
        }
    }

    pub fn read(path: &Path) -> FetchResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| FetchError::io(format!("reading {}", path.display()), e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write to `path` through a temp file and rename
    pub fn write(&self, path: &Path) -> FetchResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        let temp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&temp, json).map_err(|e| FetchError::io(format!("writing {}", temp.display()), e))?;
        fs::rename(&temp, path).map_err(|e| FetchError::io(format!("moving {} into place", temp.display()), e))
    }
}

/// The global packages folder rooted at one directory
#[derive(Debug, Clone)]
pub struct GlobalPackagesFolder {
    resolver: VersionFolderPathResolver,
}

impl GlobalPackagesFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            resolver: VersionFolderPathResolver::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        self.resolver.root_path()
    }

    pub fn resolver(&self) -> &VersionFolderPathResolver {
        &self.resolver
    }

    /// Whether `identity` is completely installed
    pub fn is_installed(&self, identity: &PackageIdentity) -> bool {
        self.resolver.nupkg_metadata_path(identity).is_file()
    }

    /// Open an installed package. `None` unless the install is complete.
    pub fn get_package(&self, identity: &PackageIdentity) -> FetchResult<Option<DownloadResourceResult>> {
        let metadata_path = self.resolver.nupkg_metadata_path(identity);
        if !metadata_path.is_file() {
            return Ok(None);
        }

        let nupkg = self.resolver.package_file_path(identity);
        let file = match fs::File::open(&nupkg) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} is missing its nupkg", self.resolver.install_path(identity).display());
                return Ok(None);
            }
            Err(e) => return Err(FetchError::io(format!("opening {}", nupkg.display()), e)),
        };

        let source = match NupkgMetadataFile::read(&metadata_path) {
            Ok(metadata) => metadata.source,
            Err(e) => {
                debug!("Unreadable {}: {}", metadata_path.display(), e);
                None
            }
        };

        Ok(Some(DownloadResourceResult::from_global_folder(
            file,
            nupkg,
            self.resolver.install_path(identity),
            source,
        )))
    }

    /// Install the nupkg read from `nupkg` as `identity`.
    ///
    /// Runs under the cross-process lock for the package. A complete
    /// install is returned as is; an incomplete one is replaced.
    pub async fn add_package<R>(
        &self,
        source: Option<&str>,
        identity: &PackageIdentity,
        nupkg: &mut R,
        parent_id: Uuid,
        token: &CancellationToken,
    ) -> FetchResult<DownloadResourceResult>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let package_path = self.resolver.package_file_path(identity);
        let _lock = concurrency::acquire(&package_path, token).await?;

        if let Some(existing) = self.get_package(identity)? {
            debug!("{} is already installed", identity);
            return Ok(existing);
        }

        let install_path = self.resolver.install_path(identity);
        if install_path.exists() {
            debug!("Removing incomplete install {}", install_path.display());
            fs::remove_dir_all(&install_path)
                .map_err(|e| FetchError::io(format!("removing {}", install_path.display()), e))?;
        }

        info!(parent = %parent_id, "Installing {} to {}", identity, install_path.display());
        if let Err(e) = self.install(source, identity, nupkg, token).await {
            if let Err(cleanup) = fs::remove_dir_all(&install_path) {
                debug!("Could not remove {}: {}", install_path.display(), cleanup);
            }
            return Err(e);
        }

        self.get_package(identity)?
            .ok_or_else(|| FetchError::Internal(format!("{} vanished after install", identity)))
    }

    async fn install<R>(
        &self,
        source: Option<&str>,
        identity: &PackageIdentity,
        nupkg: &mut R,
        token: &CancellationToken,
    ) -> FetchResult<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let install_path = self.resolver.install_path(identity);
        tokio::fs::create_dir_all(&install_path)
            .await
            .map_err(|e| FetchError::io(format!("creating {}", install_path.display()), e))?;

        let temp_nupkg = install_path.join(format!("{}.nupkg.tmp", Uuid::new_v4().simple()));
        let write = async {
            let mut file = tokio::fs::File::create(&temp_nupkg)
                .await
                .map_err(|e| FetchError::io(format!("creating {}", temp_nupkg.display()), e))?;
            tokio::io::copy(nupkg, &mut file)
                .await
                .map_err(|e| FetchError::io(format!("writing {}", temp_nupkg.display()), e))?;
            file.flush()
                .await
                .map_err(|e| FetchError::io(format!("writing {}", temp_nupkg.display()), e))?;
            Ok::<_, FetchError>(())
        };
        tokio::select! {
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            result = write => result?,
        }

        let resolver = self.resolver.clone();
        let owned_identity = identity.clone();
        let source = source.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            extract_and_commit(&resolver, &owned_identity, &temp_nupkg, source)
        })
        .await
        .map_err(|e| FetchError::Internal(format!("extraction task failed: {}", e)))?
    }

    /// Make sure `identity` is installed, downloading it from `resource` if needed
    pub async fn ensure_package(
        &self,
        identity: &PackageIdentity,
        resource: &RemoteFindPackageByIdResource,
        ctx: &SourceCacheContext,
        token: &CancellationToken,
    ) -> FetchResult<DownloadResourceResult> {
        if let Some(existing) = self.get_package(identity)? {
            return Ok(existing);
        }

        let Some(path) = resource.nupkg_path(identity, ctx, token).await? else {
            return Ok(DownloadResourceResult::not_found());
        };

        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| FetchError::io(format!("opening {}", path.display()), e))?;
        self.add_package(Some(resource.source()), identity, &mut file, Uuid::new_v4(), token)
            .await
    }

    /// Write `.nupkg.metadata` for an install that has a nupkg but lacks it
    pub fn generate_nupkg_metadata_file(
        &self,
        identity: &PackageIdentity,
        source: Option<String>,
    ) -> FetchResult<PathBuf> {
        let nupkg = self.resolver.package_file_path(identity);
        if !nupkg.is_file() {
            return Err(FetchError::PathNotFound(nupkg));
        }

        let hash_path = self.resolver.hash_path(identity);
        let content_hash = match fs::read_to_string(&hash_path) {
            Ok(hash) if !hash.trim().is_empty() => hash.trim().to_string(),
            _ => compute_content_hash(&nupkg)?,
        };

        let metadata_path = self.resolver.nupkg_metadata_path(identity);
        NupkgMetadataFile::new(content_hash, source).write(&metadata_path)?;
        Ok(metadata_path)
    }
}

/// Extract the staged nupkg and move files into place, metadata last
fn extract_and_commit(
    resolver: &VersionFolderPathResolver,
    identity: &PackageIdentity,
    temp_nupkg: &Path,
    source: Option<String>,
) -> FetchResult<()> {
    let install_path = resolver.install_path(identity);

    extract_package_files(temp_nupkg, &install_path)?;
    extract_nuspec(temp_nupkg, &resolver.manifest_file_path(identity))?;

    let content_hash = compute_content_hash(temp_nupkg)?;
    let temp_hash = install_path.join(format!("{}.sha512.tmp", Uuid::new_v4().simple()));
    fs::write(&temp_hash, &content_hash)
        .map_err(|e| FetchError::io(format!("writing {}", temp_hash.display()), e))?;

    let nupkg_path = resolver.package_file_path(identity);
    fs::rename(temp_nupkg, &nupkg_path)
        .map_err(|e| FetchError::io(format!("moving {} into place", nupkg_path.display()), e))?;

    let hash_path = resolver.hash_path(identity);
    fs::rename(&temp_hash, &hash_path)
        .map_err(|e| FetchError::io(format!("moving {} into place", hash_path.display()), e))?;

    NupkgMetadataFile::new(content_hash, source).write(&resolver.nupkg_metadata_path(identity))
}
