//! Download command - copy a nupkg to a file

use crate::cli::args::DownloadArgs;
use crate::cli::{Feed, GlobalOptions};
use crate::config::Config;
use crate::error::{FetchError, FetchResult};
use crate::ui::{self, TaskSpinner, UiContext};
use crate::version::PackageIdentity;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Execute the download command
pub async fn execute(args: DownloadArgs, config: &Config, options: &GlobalOptions) -> FetchResult<()> {
    let ctx = UiContext::detect();
    let identity = PackageIdentity::parse(&args.id, &args.version)?;
    let output = args.output.unwrap_or_else(|| default_output(&identity));
    let feed = Feed::open(config, options)?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Downloading {}...", identity));

    match download_to(&feed, &identity, &output).await {
        Ok(()) => {
            spinner.stop(&format!("Downloaded {}", identity));
            ui::key_value(&ctx, "File", &output.display().to_string());
            Ok(())
        }
        Err(e) => {
            spinner.stop_error(&format!("Could not download {}", identity));
            if let Err(cleanup) = tokio::fs::remove_file(&output).await {
                tracing::debug!("Could not remove {}: {}", output.display(), cleanup);
            }
            Err(e)
        }
    }
}

async fn download_to(feed: &Feed, identity: &PackageIdentity, output: &Path) -> FetchResult<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::io(format!("creating {}", parent.display()), e))?;
    }

    let mut file = tokio::fs::File::create(output)
        .await
        .map_err(|e| FetchError::io(format!("creating {}", output.display()), e))?;
    let found = feed
        .resource
        .copy_nupkg_to(&identity.id, &identity.version, &mut file, &feed.cache_context, &feed.token)
        .await?;
    file.flush()
        .await
        .map_err(|e| FetchError::io(format!("writing {}", output.display()), e))?;

    if !found {
        return Err(FetchError::PackageNotFound(format!(
            "{} in {}",
            identity,
            feed.resource.source()
        )));
    }
    Ok(())
}

fn default_output(identity: &PackageIdentity) -> PathBuf {
    PathBuf::from(format!("{}.{}.nupkg", identity.id_lower(), identity.version_lower()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_is_lower_case() {
        let identity = PackageIdentity::parse("Newtonsoft.Json", "13.0.1-Beta").unwrap();
        assert_eq!(default_output(&identity), PathBuf::from("newtonsoft.json.13.0.1-beta.nupkg"));
    }
}
