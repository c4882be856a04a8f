//! File-system cache helpers
//!
//! Fingerprints for cache folder names, file-name sanitizing, age-gated
//! opening of cache files and an in-use probe.

use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Hex characters kept from the SHA-256 digest
pub const HASH_LENGTH: usize = 20;

/// Characters of the original value appended by `compute_hash`
const IDENTIFIABLE_CHARACTER_LENGTH: usize = 32;

/// Fingerprint `value` for use as a folder name.
///
/// With `add_identifiable_characters`, `$` and the trailing characters of
/// the value are appended so the folder can be recognized by eye.
pub fn compute_hash(value: &str, add_identifiable_characters: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    let mut hash = hex::encode(result);
    hash.truncate(HASH_LENGTH);

    if add_identifiable_characters {
        let chars: Vec<char> = value.chars().collect();
        let start = chars.len().saturating_sub(IDENTIFIABLE_CHARACTER_LENGTH);
        let tail: String = chars[start..].iter().collect();
        hash.push('$');
        hash.push_str(&remove_invalid_file_name_chars(&tail));
    }

    hash
}

/// Replace characters that are not allowed in file names with `_`
pub fn remove_invalid_file_name_chars(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Open `path` for reading if it exists and was written within `max_age`.
///
/// A zero `max_age` never opens anything.
pub fn read_cache_file(max_age: Duration, path: &Path) -> Option<File> {
    if max_age.is_zero() {
        return None;
    }

    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }

    let modified = metadata.modified().ok()?;
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    if age >= max_age {
        debug!("Cache file {} is stale ({}s old)", path.display(), age.as_secs());
        return None;
    }

    File::open(path).ok()
}

/// True when another handle holds an exclusive lock on `path`.
///
/// Missing files are not open.
pub fn is_file_already_open(path: &Path) -> bool {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) => return e.kind() == std::io::ErrorKind::PermissionDenied,
    };

    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = file.unlock();
            false
        }
        Err(_) => true,
    }
}
