//! Local feed scanners
//!
//! Two layouts are recognized: V2 (nupkgs at the root or one folder deep,
//! named `<id>.<version>.nupkg`) and V3 (the global packages folder layout).
//! Enumeration failures are logged and produce empty results; only
//! cancellation and unreadable packages surface as errors.

use crate::error::{FetchError, FetchResult};
use crate::global_packages::VersionFolderPathResolver;
use crate::package::{read_nuspec_from_nupkg, NuspecReader};
use crate::version::{NuGetVersion, PackageIdentity};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

const NUPKG_EXTENSION: &str = ".nupkg";
const SNUPKG_EXTENSION: &str = ".snupkg";

/// Layout of a local feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedType {
    FileSystemV2,
    FileSystemV3,
    Unknown,
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedType::FileSystemV2 => write!(f, "v2"),
            FeedType::FileSystemV3 => write!(f, "v3"),
            FeedType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A package found in a local feed
#[derive(Debug, Clone)]
pub struct LocalPackageInfo {
    pub identity: PackageIdentity,
    pub path: PathBuf,
    pub last_write_time: DateTime<Utc>,
    nuspec_path: Option<PathBuf>,
    nuspec: OnceCell<NuspecReader>,
}

impl LocalPackageInfo {
    /// The package nuspec, read on first use
    pub fn nuspec(&self) -> FetchResult<&NuspecReader> {
        self.nuspec.get_or_try_init(|| match self.nuspec_path {
            Some(ref path) => {
                let file = fs::File::open(path)
                    .map_err(|e| FetchError::io(format!("opening {}", path.display()), e))?;
                NuspecReader::from_reader(file)
            }
            None => read_nuspec_from_nupkg(&self.path),
        })
    }
}

fn check_cancelled(token: &CancellationToken) -> FetchResult<()> {
    if token.is_cancelled() {
        Err(FetchError::Cancelled)
    } else {
        Ok(())
    }
}

fn last_write_time(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

/// Resolve a local feed root given as a path or `file://` URI.
///
/// Other URI schemes are rejected.
pub fn get_and_verify_root_directory(root: &str) -> FetchResult<PathBuf> {
    let failed = |reason: String| {
        FetchError::Protocol(format!(
            "Failed to verify the root directory of local source '{}': {}",
            root, reason
        ))
    };

    if root.trim().is_empty() {
        return Err(failed("empty path".to_string()));
    }

    match Url::parse(root) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| failed("not a local file URI".to_string())),
        // single letters are Windows drive prefixes
        Ok(url) if url.scheme().len() > 1 => Err(failed(format!("unsupported scheme '{}'", url.scheme()))),
        _ => Ok(PathBuf::from(root)),
    }
}

fn files_safe(dir: &Path, extension: &str, token: &CancellationToken) -> FetchResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not enumerate {}: {}", dir.display(), e);
            return Ok(Vec::new());
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        check_cancelled(token)?;
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Could not enumerate {}: {}", dir.display(), e);
                return Ok(Vec::new());
            }
        };
        let path = entry.path();
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase().ends_with(extension))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn directories_safe(dir: &Path, token: &CancellationToken) -> FetchResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not enumerate {}: {}", dir.display(), e);
            return Ok(Vec::new());
        }
    };

    let mut dirs = Vec::new();
    for entry in entries {
        check_cancelled(token)?;
        match entry {
            Ok(entry) if entry.path().is_dir() => dirs.push(entry.path()),
            Ok(_) => {}
            Err(e) => {
                warn!("Could not enumerate {}: {}", dir.display(), e);
                return Ok(Vec::new());
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Nupkgs grouped per directory: the root first, then each subfolder
fn nupkgs_from_flat_folder_chunked(root: &Path, token: &CancellationToken) -> FetchResult<Vec<Vec<PathBuf>>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    check_cancelled(token)?;

    let mut chunks = Vec::new();
    let top = files_safe(root, NUPKG_EXTENSION, token)?;
    if !top.is_empty() {
        chunks.push(top);
    }
    for dir in directories_safe(root, token)? {
        let files = files_safe(&dir, NUPKG_EXTENSION, token)?;
        if !files.is_empty() {
            chunks.push(files);
        }
    }
    Ok(chunks)
}

/// Every nupkg at the root or one level deep
pub fn get_nupkgs_from_flat_folder(root: &str, token: &CancellationToken) -> FetchResult<Vec<PathBuf>> {
    let root = get_and_verify_root_directory(root)?;
    Ok(nupkgs_from_flat_folder_chunked(&root, token)?
        .into_iter()
        .flatten()
        .collect())
}

/// Nupkgs whose file name could belong to `id`
pub fn get_nupkgs_from_flat_folder_by_id(
    root: &str,
    id: &str,
    token: &CancellationToken,
) -> FetchResult<Vec<PathBuf>> {
    Ok(get_nupkgs_from_flat_folder(root, token)?
        .into_iter()
        .filter(|path| is_possible_package_match_id(path, id))
        .collect())
}

/// Read identity and metadata from a nupkg file
fn package_from_nupkg(path: &Path) -> FetchResult<LocalPackageInfo> {
    let nuspec = read_nuspec_from_nupkg(path).map_err(|e| {
        FetchError::Protocol(format!("The file '{}' is corrupt or invalid: {}", path.display(), e))
    })?;
    Ok(LocalPackageInfo {
        identity: nuspec.identity(),
        path: path.to_path_buf(),
        last_write_time: last_write_time(path),
        nuspec_path: None,
        nuspec: OnceCell::with_value(nuspec),
    })
}

fn packages_from_nupkgs(files: Vec<PathBuf>, token: &CancellationToken) -> FetchResult<Vec<LocalPackageInfo>> {
    files
        .iter()
        .map(|file| {
            check_cancelled(token)?;
            package_from_nupkg(file)
        })
        .collect()
}

/// All packages in a V2 folder
pub fn get_packages_v2(root: &str, token: &CancellationToken) -> FetchResult<Vec<LocalPackageInfo>> {
    packages_from_nupkgs(get_nupkgs_from_flat_folder(root, token)?, token)
}

/// All packages of `id` in a V2 folder.
///
/// File names only hint at the id (`a.1.1.0.nupkg` may be `a.1` 1.0), so
/// candidates are checked against their nuspec.
pub fn get_packages_v2_by_id(
    root: &str,
    id: &str,
    token: &CancellationToken,
) -> FetchResult<Vec<LocalPackageInfo>> {
    let packages = packages_from_nupkgs(get_nupkgs_from_flat_folder_by_id(root, id, token)?, token)?;
    Ok(packages
        .into_iter()
        .filter(|p| p.identity.id.eq_ignore_ascii_case(id))
        .collect())
}

/// Find `identity` in a V2 folder.
///
/// Directories are searched in order. Within one directory a file whose
/// version string matches exactly (`1.0` vs `1.0.0.0`) wins over other
/// equivalent versions.
pub fn get_package_v2(
    root: &str,
    identity: &PackageIdentity,
    token: &CancellationToken,
) -> FetchResult<Option<LocalPackageInfo>> {
    let root = get_and_verify_root_directory(root)?;

    for chunk in nupkgs_from_flat_folder_chunked(&root, token)? {
        let mut fallback = None;
        for file in chunk.iter().filter(|f| is_possible_package_match(f, identity)) {
            check_cancelled(token)?;
            let package = package_from_nupkg(file)?;
            if package.identity != *identity {
                continue;
            }
            if package
                .identity
                .version
                .original()
                .eq_ignore_ascii_case(identity.version.original())
            {
                return Ok(Some(package));
            }
            if fallback.is_none() {
                fallback = Some(package);
            }
        }
        if fallback.is_some() {
            return Ok(fallback);
        }
    }
    Ok(None)
}

/// Find `identity` in a V3 folder. The nupkg, nuspec and hash file must
/// all exist.
pub fn get_package_v3(root: &str, identity: &PackageIdentity) -> FetchResult<Option<LocalPackageInfo>> {
    let root = get_and_verify_root_directory(root)?;
    Ok(package_v3(&VersionFolderPathResolver::new(root), identity))
}

fn package_v3(resolver: &VersionFolderPathResolver, identity: &PackageIdentity) -> Option<LocalPackageInfo> {
    let nupkg = resolver.package_file_path(identity);
    let nuspec = resolver.manifest_file_path(identity);
    let hash = resolver.hash_path(identity);

    for required in [&nupkg, &nuspec, &hash] {
        if !required.is_file() {
            debug!("Missing {}", required.display());
            return None;
        }
    }

    Some(LocalPackageInfo {
        identity: identity.clone(),
        last_write_time: last_write_time(&nupkg),
        path: nupkg,
        nuspec_path: Some(nuspec),
        nuspec: OnceCell::new(),
    })
}

fn package_v3_from_names(resolver: &VersionFolderPathResolver, id: &str, version: &str) -> Option<LocalPackageInfo> {
    match NuGetVersion::parse(version) {
        Ok(version) => package_v3(resolver, &PackageIdentity::new(id, version)),
        Err(_) => {
            warn!("Unable to parse version folder '{}' of '{}'", version, id);
            None
        }
    }
}

/// All packages in a V3 folder
pub fn get_packages_v3(root: &str, token: &CancellationToken) -> FetchResult<Vec<LocalPackageInfo>> {
    check_cancelled(token)?;
    let root_dir = get_and_verify_root_directory(root)?;
    if !root_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut packages = Vec::new();
    for id_dir in directories_safe(&root_dir, token)? {
        let Some(id) = id_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        packages.extend(get_packages_v3_by_id(root, &id, token)?);
    }
    Ok(packages)
}

/// All versions of `id` in a V3 folder
pub fn get_packages_v3_by_id(
    root: &str,
    id: &str,
    token: &CancellationToken,
) -> FetchResult<Vec<LocalPackageInfo>> {
    check_cancelled(token)?;
    let resolver = VersionFolderPathResolver::new(get_and_verify_root_directory(root)?);
    let id_root = resolver.version_list_path(id);
    if !id_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut packages = Vec::new();
    for version_dir in directories_safe(&id_root, token)? {
        let Some(version) = version_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if let Some(package) = package_v3_from_names(&resolver, id, &version) {
            packages.push(package);
        }
    }
    Ok(packages)
}

/// Detect the layout of a local feed.
///
/// Any nupkg at the root or one level deep means V2; a complete
/// `<id>/<version>/` install means V3.
pub fn get_local_feed_type(root: &str, token: &CancellationToken) -> FetchResult<FeedType> {
    let root_dir = get_and_verify_root_directory(root)?;
    if !root_dir.is_dir() {
        return Ok(FeedType::Unknown);
    }

    if !files_safe(&root_dir, NUPKG_EXTENSION, token)?.is_empty() {
        return Ok(FeedType::FileSystemV2);
    }

    let resolver = VersionFolderPathResolver::new(&root_dir);
    for id_dir in directories_safe(&root_dir, token)? {
        if !files_safe(&id_dir, NUPKG_EXTENSION, token)?.is_empty() {
            return Ok(FeedType::FileSystemV2);
        }

        let id = id_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for version_dir in directories_safe(&id_dir, token)? {
            let version = version_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if package_v3_from_names(&resolver, &id, &version).is_some() {
                return Ok(FeedType::FileSystemV3);
            }
        }
    }
    Ok(FeedType::Unknown)
}

/// Read a single nupkg given as a path or `file://` URI
pub fn get_package(path: &str) -> FetchResult<LocalPackageInfo> {
    let path = match Url::parse(path) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| FetchError::PathInvalid {
                path: PathBuf::from(path),
                reason: "not a local file URI".to_string(),
            })?,
        _ => PathBuf::from(path),
    };
    package_from_nupkg(&path)
}

/// Whether the file name reads as `identity`. Names ending in digits are
/// ambiguous, so the nuspec has the final word.
pub fn is_possible_package_match(file: &Path, identity: &PackageIdentity) -> bool {
    get_identity_from_nupkg_path(file, &identity.id).is_some_and(|found| found == *identity)
}

/// Whether the file name reads as `id` followed by a version
pub fn is_possible_package_match_id(file: &Path, id: &str) -> bool {
    get_identity_from_nupkg_path(file, id).is_some()
}

/// Identity implied by a `<id>.<version>.nupkg` file name
pub fn get_identity_from_nupkg_path(file: &Path, id: &str) -> Option<PackageIdentity> {
    let name = file.file_name()?.to_string_lossy();
    get_version_from_file_name(&name, id, NUPKG_EXTENSION).map(|version| PackageIdentity::new(id, version))
}

/// Version in `<id>.<version><extension>`. Symbol packages are skipped.
pub fn get_version_from_file_name(file_name: &str, id: &str, extension: &str) -> Option<NuGetVersion> {
    let lower = file_name.to_ascii_lowercase();
    if !lower.ends_with(&extension.to_ascii_lowercase()) {
        return None;
    }

    let stem = &file_name[..file_name.len() - extension.len()];
    if stem.to_ascii_lowercase().ends_with(".symbols") {
        return None;
    }

    let prefix = format!("{}.", id);
    match (stem.get(..prefix.len()), stem.get(prefix.len()..)) {
        (Some(head), Some(rest)) if !rest.is_empty() && head.eq_ignore_ascii_case(&prefix) => {
            NuGetVersion::parse(rest).ok()
        }
        _ => None,
    }
}

/// First package per identity, in input order
pub fn get_distinct_packages<I>(packages: I) -> Vec<LocalPackageInfo>
where
    I: IntoIterator<Item = LocalPackageInfo>,
{
    let mut seen = HashSet::new();
    packages
        .into_iter()
        .filter(|p| seen.insert(p.identity.clone()))
        .collect()
}

/// Expand a package path that may contain wildcards.
///
/// A wildcard path without a package extension gets `*.nupkg` (or
/// `*.snupkg`) appended. A plain path is returned as is when it exists.
pub fn resolve_package_from_path(package_path: &str, is_snupkg: bool) -> FetchResult<Vec<PathBuf>> {
    if !package_path.contains('*') {
        let path = PathBuf::from(package_path);
        return Ok(if path.exists() { vec![path] } else { Vec::new() });
    }

    let pattern = ensure_package_extension(package_path, is_snupkg);
    let paths = glob::glob(&pattern).map_err(|e| FetchError::PathInvalid {
        path: PathBuf::from(package_path),
        reason: e.to_string(),
    })?;

    let mut matches = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => matches.push(path),
            Ok(_) => {}
            Err(e) => debug!("Skipping unreadable path: {}", e),
        }
    }
    Ok(matches)
}

fn ensure_package_extension(package_path: &str, is_snupkg: bool) -> String {
    let lower = package_path.to_ascii_lowercase();
    if lower.ends_with(NUPKG_EXTENSION) || lower.ends_with(SNUPKG_EXTENSION) {
        return package_path.to_string();
    }

    let mut pattern = package_path.to_string();
    if pattern.ends_with("**") {
        pattern.push(std::path::MAIN_SEPARATOR);
        pattern.push('*');
    } else if !pattern.ends_with('*') {
        pattern.push('*');
    }
    pattern.push_str(if is_snupkg { SNUPKG_EXTENSION } else { NUPKG_EXTENSION });
    pattern
}

/// Fail when a package path matched nothing
pub fn ensure_package_file_exists(package_path: &str, matches: &[PathBuf]) -> FetchResult<()> {
    if matches.is_empty() {
        return Err(FetchError::User(format!("Unable to find file '{}'.", package_path)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_nupkg;
    use tempfile::TempDir;

    fn root_str(temp: &TempDir) -> String {
        temp.path().to_string_lossy().into_owned()
    }

    fn write_nupkg(dir: &Path, file: &str, id: &str, version: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(file);
        fs::write(&path, build_nupkg(id, version)).unwrap();
        path
    }

    fn write_v3(root: &Path, id: &str, version: &str) {
        let resolver = VersionFolderPathResolver::new(root);
        let identity = PackageIdentity::parse(id, version).unwrap();
        let install = resolver.install_path(&identity);
        fs::create_dir_all(&install).unwrap();
        fs::write(resolver.package_file_path(&identity), build_nupkg(id, version)).unwrap();
        fs::write(resolver.manifest_file_path(&identity), crate::test_support::nuspec_xml(id, version)).unwrap();
        fs::write(resolver.hash_path(&identity), "hash").unwrap();
    }

    #[test]
    fn version_from_file_name() {
        let v = |name: &str, id: &str| get_version_from_file_name(name, id, ".nupkg").map(|v| v.to_string());
        assert_eq!(v("a.1.0.0.nupkg", "a").as_deref(), Some("1.0.0"));
        assert_eq!(v("A.2.0-beta.NUPKG", "a").as_deref(), Some("2.0.0-beta"));
        assert_eq!(v("a.1.0.0.symbols.nupkg", "a"), None);
        assert_eq!(v("b.1.0.0.nupkg", "a"), None);
        assert_eq!(v("a.nupkg", "a"), None);
        assert_eq!(v("a.1.0.0.zip", "a"), None);
    }

    #[test]
    fn root_directory_forms() {
        assert_eq!(get_and_verify_root_directory("/feeds/local").unwrap(), Path::new("/feeds/local"));
        assert_eq!(
            get_and_verify_root_directory("file:///feeds/local").unwrap(),
            Path::new("/feeds/local")
        );
        assert_eq!(get_and_verify_root_directory("relative/dir").unwrap(), Path::new("relative/dir"));
        assert!(get_and_verify_root_directory("https://api.nuget.org/v3/index.json").is_err());
        assert!(get_and_verify_root_directory("").is_err());
    }

    #[test]
    fn feed_type_detection() {
        let token = CancellationToken::new();

        let empty = TempDir::new().unwrap();
        assert_eq!(get_local_feed_type(&root_str(&empty), &token).unwrap(), FeedType::Unknown);

        let v2 = TempDir::new().unwrap();
        write_nupkg(&v2.path().join("a"), "a.1.0.0.nupkg", "a", "1.0.0");
        assert_eq!(get_local_feed_type(&root_str(&v2), &token).unwrap(), FeedType::FileSystemV2);

        let v3 = TempDir::new().unwrap();
        write_v3(v3.path(), "a", "1.0.0");
        assert_eq!(get_local_feed_type(&root_str(&v3), &token).unwrap(), FeedType::FileSystemV3);

        assert_eq!(
            get_local_feed_type("/does/not/exist", &token).unwrap(),
            FeedType::Unknown
        );
    }

    #[test]
    fn v2_listing_checks_nuspec_ids() {
        let temp = TempDir::new().unwrap();
        let token = CancellationToken::new();
        write_nupkg(temp.path(), "a.1.0.0.nupkg", "a", "1.0.0");
        // file name suggests a 1.1.0 but the package is a.1 1.0.0
        write_nupkg(temp.path(), "a.1.1.0.0.nupkg", "a.1", "1.0.0");
        write_nupkg(&temp.path().join("sub"), "a.2.0.0.nupkg", "a", "2.0.0");
        write_nupkg(&temp.path().join("sub").join("deeper"), "a.3.0.0.nupkg", "a", "3.0.0");

        assert_eq!(get_packages_v2(&root_str(&temp), &token).unwrap().len(), 3);

        let mut versions: Vec<String> = get_packages_v2_by_id(&root_str(&temp), "A", &token)
            .unwrap()
            .iter()
            .map(|p| p.identity.version.to_string())
            .collect();
        versions.sort();
        assert_eq!(versions, vec!["1.0.0", "2.0.0"]);
    }

    #[test]
    fn v2_exact_version_string_preferred() {
        let temp = TempDir::new().unwrap();
        let token = CancellationToken::new();
        write_nupkg(temp.path(), "a.1.0.0.0.nupkg", "a", "1.0.0.0");
        write_nupkg(temp.path(), "a.1.0.nupkg", "a", "1.0");

        let wanted = PackageIdentity::parse("a", "1.0").unwrap();
        let found = get_package_v2(&root_str(&temp), &wanted, &token).unwrap().unwrap();
        assert_eq!(found.path.file_name().unwrap(), "a.1.0.nupkg");

        let normalized = PackageIdentity::parse("a", "1.0.0").unwrap();
        let found = get_package_v2(&root_str(&temp), &normalized, &token).unwrap().unwrap();
        assert_eq!(found.identity, normalized);

        let missing = PackageIdentity::parse("a", "9.0").unwrap();
        assert!(get_package_v2(&root_str(&temp), &missing, &token).unwrap().is_none());
    }

    #[test]
    fn v3_requires_all_files() {
        let temp = TempDir::new().unwrap();
        let token = CancellationToken::new();
        write_v3(temp.path(), "Contoso", "1.0.0");
        write_v3(temp.path(), "Contoso", "2.0.0");
        write_v3(temp.path(), "Other", "1.0.0");

        let identity = PackageIdentity::parse("Contoso", "2.0.0").unwrap();
        let package = get_package_v3(&root_str(&temp), &identity).unwrap().unwrap();
        assert_eq!(package.nuspec().unwrap().id, "Contoso");

        let resolver = VersionFolderPathResolver::new(temp.path());
        fs::remove_file(resolver.hash_path(&identity)).unwrap();
        assert!(get_package_v3(&root_str(&temp), &identity).unwrap().is_none());

        assert_eq!(get_packages_v3_by_id(&root_str(&temp), "contoso", &token).unwrap().len(), 1);
        assert_eq!(get_packages_v3(&root_str(&temp), &token).unwrap().len(), 2);
    }

    #[test]
    fn cancellation_stops_enumeration() {
        let temp = TempDir::new().unwrap();
        write_nupkg(temp.path(), "a.1.0.0.nupkg", "a", "1.0.0");
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            get_packages_v2(&root_str(&temp), &token),
            Err(FetchError::Cancelled)
        ));
    }

    #[test]
    fn corrupt_nupkg_is_an_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.1.0.0.nupkg"), b"nope").unwrap();
        let err = get_packages_v2(&root_str(&temp), &CancellationToken::new()).unwrap_err();
        assert!(err.to_string().contains("corrupt or invalid"));
    }

    #[test]
    fn single_package_and_distinct() {
        let temp = TempDir::new().unwrap();
        let a = write_nupkg(temp.path(), "a.1.0.0.nupkg", "a", "1.0.0");
        let b = write_nupkg(&temp.path().join("copy"), "a.1.0.0.nupkg", "a", "1.0.0");

        let uri = Url::from_file_path(&a).unwrap().to_string();
        let first = get_package(&uri).unwrap();
        let second = get_package(&b.to_string_lossy()).unwrap();
        assert_eq!(first.identity, second.identity);
        assert_eq!(get_distinct_packages(vec![first, second]).len(), 1);
    }

    #[test]
    fn wildcard_resolution() {
        let temp = TempDir::new().unwrap();
        write_nupkg(temp.path(), "a.1.0.0.nupkg", "a", "1.0.0");
        write_nupkg(&temp.path().join("nested"), "b.1.0.0.nupkg", "b", "1.0.0");
        fs::write(temp.path().join("notes.txt"), b"x").unwrap();
        let root = root_str(&temp);

        let top = resolve_package_from_path(&format!("{root}/*"), false).unwrap();
        assert_eq!(top, vec![temp.path().join("a.1.0.0.nupkg")]);

        let all = resolve_package_from_path(&format!("{root}/**"), false).unwrap();
        assert_eq!(all.len(), 2);

        let plain = format!("{root}/a.1.0.0.nupkg");
        assert_eq!(resolve_package_from_path(&plain, false).unwrap().len(), 1);

        let none = resolve_package_from_path(&format!("{root}/*.snupkg"), true).unwrap();
        assert!(ensure_package_file_exists("x", &none).is_err());
        assert!(ensure_package_file_exists("x", &all).is_ok());
    }

    #[test]
    fn extension_is_appended_to_wildcards() {
        assert_eq!(ensure_package_extension("dir/*", false), "dir/*.nupkg");
        assert_eq!(ensure_package_extension("dir/a", true), "dir/a*.snupkg");
        assert_eq!(ensure_package_extension("dir/*.nupkg", false), "dir/*.nupkg");
        assert_eq!(
            ensure_package_extension("dir/**", false),
            format!("dir/**{}*.nupkg", std::path::MAIN_SEPARATOR)
        );
    }
}
