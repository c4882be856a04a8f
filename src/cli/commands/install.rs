//! Install command - place a package in the global packages folder

use crate::cli::args::InstallArgs;
use crate::cli::{Feed, GlobalOptions};
use crate::config::Config;
use crate::context::PackageDownloadContext;
use crate::download_result::{
    cleanup_direct_downloads, get_download_result, DownloadResourceResult, DownloadResourceResultStatus,
};
use crate::error::{FetchError, FetchResult};
use crate::global_packages::GlobalPackagesFolder;
use crate::ui::{self, TaskSpinner, UiContext};
use crate::version::PackageIdentity;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Execute the install command
pub async fn execute(args: InstallArgs, config: &Config, options: &GlobalOptions) -> FetchResult<()> {
    let ctx = UiContext::detect();
    let identity = PackageIdentity::parse(&args.id, &args.version)?;
    let mut feed = Feed::open(config, options)?;
    feed.cache_context.direct_download |= args.direct.is_some();

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Installing {}...", identity));

    let outcome = match args.direct {
        Some(ref dir) => install_direct(&feed, &identity, dir).await,
        None => install_global(&feed, &identity).await,
    };

    match outcome {
        Ok(path) => {
            spinner.stop(&format!("Installed {}", identity));
            ui::key_value(&ctx, "Path", &path.display().to_string());
            Ok(())
        }
        Err(e) => {
            spinner.stop_error(&format!("Could not install {}", identity));
            Err(e)
        }
    }
}

async fn install_global(feed: &Feed, identity: &PackageIdentity) -> FetchResult<PathBuf> {
    let folder = GlobalPackagesFolder::new(&feed.global_packages_folder);
    let result = folder
        .ensure_package(identity, &feed.resource, &feed.cache_context, &feed.token)
        .await?;
    check_status(&result, identity, feed.resource.source())?;

    result
        .install_path()
        .map(Path::to_path_buf)
        .ok_or_else(|| FetchError::Internal(format!("{} has no install path", identity)))
}

/// Download into `dir` without touching the global packages folder
async fn install_direct(feed: &Feed, identity: &PackageIdentity, dir: &Path) -> FetchResult<PathBuf> {
    let url = feed
        .resource
        .get_package_url(&identity.id, &identity.version, &feed.cache_context, &feed.token)
        .await?
        .ok_or_else(|| not_found(identity, feed.resource.source()))?;

    let download_ctx = PackageDownloadContext::new(&feed.cache_context).with_direct_download_directory(dir);

    let result = get_download_result(
        &feed.http_source,
        identity,
        &url,
        &download_ctx,
        &feed.global_packages_folder,
        &feed.token,
    )
    .await?;
    check_status(&result, identity, feed.resource.source())?;

    let temp = result
        .path()
        .ok_or_else(|| FetchError::Internal(format!("{} has no download path", identity)))?;
    let target = dir.join(format!("{}.{}.nupkg", identity.id_lower(), identity.version_lower()));
    debug!("Copying {} to {}", temp.display(), target.display());
    tokio::fs::copy(temp, &target)
        .await
        .map_err(|e| FetchError::io(format!("copying to {}", target.display()), e))?;

    drop(result);
    cleanup_direct_downloads(&download_ctx);
    Ok(target)
}

fn check_status(result: &DownloadResourceResult, identity: &PackageIdentity, source: &str) -> FetchResult<()> {
    match result.status() {
        DownloadResourceResultStatus::Available => Ok(()),
        DownloadResourceResultStatus::NotFound => Err(not_found(identity, source)),
        DownloadResourceResultStatus::Cancelled => Err(FetchError::Cancelled),
    }
}

fn not_found(identity: &PackageIdentity, source: &str) -> FetchError {
    FetchError::PackageNotFound(format!("{} in {}", identity, source))
}
