//! nuget-fetch - NuGet package download and caching
//!
//! Downloads nupkgs from flat container feeds through an on-disk HTTP
//! cache, installs them into the global packages folder and scans local
//! feeds. Concurrent requests for the same nupkg share one download.

pub mod caching;
pub mod cli;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod download_result;
pub mod downloader;
pub mod error;
pub mod global_packages;
pub mod http;
pub mod local_folder;
pub mod package;
pub mod remote;
pub mod timeout;
pub mod ui;
pub mod version;

#[cfg(test)]
mod test_support;

pub use error::{FetchError, FetchResult};
