//! Nupkg archive access
//!
//! A nupkg is a zip with exactly one nuspec at its root plus OPC packaging
//! parts that are not extracted into the global packages folder.

use super::nuspec::NuspecReader;
use crate::error::{FetchError, FetchResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha512};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

const SIGNATURE_FILE: &str = ".signature.p7s";
const CONTENT_TYPES_FILE: &str = "[Content_Types].xml";

fn open_archive(path: &Path) -> FetchResult<ZipArchive<BufReader<File>>> {
    let file = File::open(path).map_err(|e| FetchError::io(format!("opening {}", path.display()), e))?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| FetchError::invalid_package(path, e.to_string()))
}

/// Name of the root-level nuspec entry, if the archive has one
pub fn find_nuspec_entry<R: Read + Seek>(archive: &ZipArchive<R>) -> Option<String> {
    archive
        .file_names()
        .find(|name| !name.contains('/') && name.to_ascii_lowercase().ends_with(".nuspec"))
        .map(str::to_string)
}

fn read_nuspec<R: Read + Seek>(path: &Path, archive: &mut ZipArchive<R>) -> FetchResult<NuspecReader> {
    let entry = find_nuspec_entry(archive)
        .ok_or_else(|| FetchError::invalid_package(path, "no nuspec at the package root"))?;
    let mut file = archive
        .by_name(&entry)
        .map_err(|e| FetchError::invalid_package(path, e.to_string()))?;
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| FetchError::invalid_package(path, format!("reading {}: {}", entry, e)))?;
    NuspecReader::parse(&xml)
}

/// Parse the nuspec embedded in the nupkg at `path`
pub fn read_nuspec_from_nupkg(path: &Path) -> FetchResult<NuspecReader> {
    let mut archive = open_archive(path)?;
    read_nuspec(path, &mut archive)
}

/// Check that `path` is a readable zip with a valid root nuspec
pub fn validate_nupkg(path: &Path) -> FetchResult<()> {
    read_nuspec_from_nupkg(path).map(|_| ())
}

fn is_packaging_part(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("_rels/")
        || lower.starts_with("package/")
        || lower == CONTENT_TYPES_FILE.to_ascii_lowercase()
        || lower == SIGNATURE_FILE
        || (!lower.contains('/') && lower.ends_with(".nuspec"))
}

/// Extract the package payload into `dest`.
///
/// Packaging parts and the root nuspec are skipped; the caller writes the
/// nuspec under its normalized name. Returns the extracted files.
pub fn extract_package_files(nupkg: &Path, dest: &Path) -> FetchResult<Vec<PathBuf>> {
    let mut archive = open_archive(nupkg)?;
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| FetchError::invalid_package(nupkg, e.to_string()))?;
        if entry.is_dir() || is_packaging_part(entry.name()) {
            continue;
        }

        let Some(relative) = entry.enclosed_name() else {
            return Err(FetchError::invalid_package(
                nupkg,
                format!("entry escapes the package folder: {}", entry.name()),
            ));
        };
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| FetchError::io(format!("creating {}", parent.display()), e))?;
        }

        let mut out =
            File::create(&target).map_err(|e| FetchError::io(format!("creating {}", target.display()), e))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| FetchError::io(format!("extracting {}", target.display()), e))?;
        extracted.push(target);
    }

    debug!("Extracted {} files from {}", extracted.len(), nupkg.display());
    Ok(extracted)
}

/// Write the embedded nuspec to `target`
pub fn extract_nuspec(nupkg: &Path, target: &Path) -> FetchResult<NuspecReader> {
    let mut archive = open_archive(nupkg)?;
    let reader = read_nuspec(nupkg, &mut archive)?;
    let entry = find_nuspec_entry(&archive)
        .ok_or_else(|| FetchError::invalid_package(nupkg, "no nuspec at the package root"))?;
    let mut file = archive
        .by_name(&entry)
        .map_err(|e| FetchError::invalid_package(nupkg, e.to_string()))?;
    let mut out = File::create(target).map_err(|e| FetchError::io(format!("creating {}", target.display()), e))?;
    io::copy(&mut file, &mut out).map_err(|e| FetchError::io(format!("writing {}", target.display()), e))?;
    Ok(reader)
}

/// Base64 SHA-512 of the file at `path`, the form stored in `.nupkg.sha512`
pub fn compute_content_hash(path: &Path) -> FetchResult<String> {
    let mut file = File::open(path).map_err(|e| FetchError::io(format!("opening {}", path.display()), e))?;
    let mut hasher = Sha512::new();
    io::copy(&mut file, &mut hasher).map_err(|e| FetchError::io(format!("hashing {}", path.display()), e))?;
    Ok(STANDARD.encode(hasher.finalize()))
}
