//! Package archives and manifests

pub mod archive;
pub mod nuspec;

pub use archive::{
    compute_content_hash, extract_nuspec, extract_package_files, read_nuspec_from_nupkg,
    validate_nupkg,
};
pub use nuspec::{DependencyGroup, NuspecReader, PackageDependency};
