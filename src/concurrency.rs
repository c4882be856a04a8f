//! Cross-process file locks
//!
//! Locks are taken on a side file under the scratch directory named after a
//! fingerprint of the protected path, so the protected file itself can be
//! replaced or deleted while the lock is held.

use crate::caching::compute_hash;
use crate::config::ConfigManager;
use crate::error::{FetchError, FetchResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Holds an exclusive lock until dropped
pub struct FileLockGuard {
    file: File,
    lock_path: PathBuf,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        trace!("Released lock {}", self.lock_path.display());
    }
}

/// Lock file used to guard `path`
pub fn lock_path_for(path: &Path) -> PathBuf {
    lock_dir().join(format!(
        "{}.lock",
        compute_hash(&path.to_string_lossy(), false)
    ))
}

fn lock_dir() -> PathBuf {
    ConfigManager::scratch_dir().join("lock")
}

/// Acquire the exclusive lock guarding `path`, polling until it is free.
pub async fn acquire(path: &Path, token: &CancellationToken) -> FetchResult<FileLockGuard> {
    let lock_path = lock_path_for(path);
    if let Some(parent) = lock_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::io(format!("creating lock directory {}", parent.display()), e))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| FetchError::io(format!("opening lock file {}", lock_path.display()), e))?;

    let mut attempts: u64 = 0;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => break,
            Err(_) => {
                if token.is_cancelled() {
                    return Err(FetchError::Cancelled);
                }
                attempts += 1;
                if attempts == 1 {
                    debug!("Waiting for lock on {}", path.display());
                }
                tokio::select! {
                    _ = token.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }

    trace!("Acquired lock {} for {}", lock_path.display(), path.display());
    Ok(FileLockGuard { file, lock_path })
}

/// Run `action` while holding the lock guarding `path`
pub async fn with_file_lock<F, Fut, T>(
    path: &Path,
    token: &CancellationToken,
    action: F,
) -> FetchResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    let _guard = acquire(path, token).await?;
    action().await
}
