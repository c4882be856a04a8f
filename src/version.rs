//! Package versions and identities
//!
//! `NuGetVersion` accepts one to four numeric parts (`1`, `1.2`, `1.2.3`,
//! `1.2.3.4`) followed by an optional prerelease label and build metadata.
//! Prerelease ordering follows SemVer 2.0 and compares labels
//! case-insensitively.

use crate::error::{FetchError, FetchResult};
use semver::{BuildMetadata, Prerelease};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A NuGet package version
#[derive(Debug, Clone)]
pub struct NuGetVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    release: String,
    release_key: Prerelease,
    metadata: String,
    original: String,
}

impl NuGetVersion {
    /// Parse a version string
    pub fn parse(value: &str) -> FetchResult<Self> {
        let invalid = || FetchError::InvalidVersion(value.to_string());
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let (rest, metadata) = match trimmed.split_once('+') {
            Some((rest, meta)) => {
                if meta.is_empty() {
                    return Err(invalid());
                }
                BuildMetadata::new(meta).map_err(|_| invalid())?;
                (rest, meta.to_string())
            }
            None => (trimmed, String::new()),
        };

        let (numbers, release) = match rest.split_once('-') {
            Some((_, "")) => return Err(invalid()),
            Some((numbers, release)) => (numbers, release.to_string()),
            None => (rest, String::new()),
        };

        let mut parts = [0u64; 4];
        let mut count = 0;
        for piece in numbers.split('.') {
            if count == 4 || piece.is_empty() || !piece.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            parts[count] = piece.parse().map_err(|_| invalid())?;
            count += 1;
        }

        let release_key = if release.is_empty() {
            Prerelease::EMPTY
        } else {
            Prerelease::new(&release.to_ascii_lowercase()).map_err(|_| invalid())?
        };

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            revision: parts[3],
            release,
            release_key,
            metadata,
            original: trimmed.to_string(),
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Prerelease label without the leading `-`, empty for stable versions
    pub fn release(&self) -> &str {
        &self.release
    }

    /// Build metadata without the leading `+`
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn is_prerelease(&self) -> bool {
        !self.release.is_empty()
    }

    /// The string this version was parsed from
    pub fn original(&self) -> &str {
        &self.original
    }

    /// `major.minor.patch[.revision][-release]`, metadata dropped
    pub fn to_normalized_string(&self) -> String {
        let mut s = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision > 0 {
            s.push_str(&format!(".{}", self.revision));
        }
        if !self.release.is_empty() {
            s.push('-');
            s.push_str(&self.release);
        }
        s
    }

    fn key(&self) -> (u64, u64, u64, u64) {
        (self.major, self.minor, self.patch, self.revision)
    }
}

impl FromStr for NuGetVersion {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_normalized_string())
    }
}

impl PartialEq for NuGetVersion {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key() && self.release_key == other.release_key
    }
}

impl Eq for NuGetVersion {}

impl Hash for NuGetVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
        self.release_key.hash(state);
    }
}

impl PartialOrd for NuGetVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NuGetVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Prerelease::EMPTY sorts after every label
        self.key()
            .cmp(&other.key())
            .then_with(|| self.release_key.cmp(&other.release_key))
    }
}

/// A package id and version pair. Ids compare case-insensitively.
#[derive(Debug, Clone)]
pub struct PackageIdentity {
    pub id: String,
    pub version: NuGetVersion,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: NuGetVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// Parse `id` and `version` strings
    pub fn parse(id: &str, version: &str) -> FetchResult<Self> {
        Ok(Self::new(id, NuGetVersion::parse(version)?))
    }

    pub fn id_lower(&self) -> String {
        self.id.to_lowercase()
    }

    pub fn version_lower(&self) -> String {
        self.version.to_normalized_string().to_lowercase()
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id.eq_ignore_ascii_case(&other.id) && self.version == other.version
    }
}

impl Eq for PackageIdentity {}

impl Hash for PackageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.to_ascii_lowercase().hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> NuGetVersion {
        NuGetVersion::parse(s).unwrap()
    }

    #[test]
    fn parses_short_and_long_forms() {
        assert_eq!(v("1").to_normalized_string(), "1.0.0");
        assert_eq!(v("1.2").to_normalized_string(), "1.2.0");
        assert_eq!(v("1.2.3.4").to_normalized_string(), "1.2.3.4");
        assert_eq!(v("1.2.3.0").to_normalized_string(), "1.2.3");
        assert_eq!(v("2.0.0-Beta.1+sha.abc").to_normalized_string(), "2.0.0-Beta.1");
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "a.b", "1..2", "1.2.3.4.5", "1.0-", "1.0.0+", " . "] {
            assert!(NuGetVersion::parse(bad).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn equality_ignores_trailing_zeros_and_case() {
        assert_eq!(v("1.0"), v("1.0.0.0"));
        assert_eq!(v("1.0.0-BETA"), v("1.0.0-beta"));
        assert_eq!(v("1.0.0+meta"), v("1.0.0"));
        assert_eq!(v("01.0").original(), "01.0");
    }

    #[test]
    fn ordering_follows_semver() {
        let mut versions = vec![v("1.0.0"), v("1.0.0-rc.1"), v("1.0.0-beta"), v("0.9.9.9"), v("1.0.0.1")];
        versions.sort();
        let sorted: Vec<String> = versions.iter().map(|v| v.to_normalized_string()).collect();
        assert_eq!(sorted, vec!["0.9.9.9", "1.0.0-beta", "1.0.0-rc.1", "1.0.0", "1.0.0.1"]);
    }

    #[test]
    fn identity_compares_id_case_insensitively() {
        let a = PackageIdentity::parse("Newtonsoft.Json", "13.0.1").unwrap();
        let b = PackageIdentity::parse("newtonsoft.json", "13.0.1.0").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Newtonsoft.Json 13.0.1");
        assert_eq!(b.id_lower(), "newtonsoft.json");
    }
}
