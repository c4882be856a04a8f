//! Local command - inspect a local feed

use crate::cli::args::{LocalAction, LocalArgs, OutputFormat};
use crate::error::{FetchError, FetchResult};
use crate::local_folder::{self, FeedType, LocalPackageInfo};
use crate::ui::{self, UiContext};
use tokio_util::sync::CancellationToken;

/// Execute the local command
pub async fn execute(args: LocalArgs) -> FetchResult<()> {
    let token = crate::cli::cancel_on_ctrl_c();

    match args.action {
        LocalAction::Type { root } => {
            let feed_type = scan(move |token| local_folder::get_local_feed_type(&root, token), token).await?;
            println!("{}", feed_type);
            Ok(())
        }
        LocalAction::List { root, id, format } => {
            let packages = scan(move |token| list_packages(&root, id.as_deref(), token), token).await?;
            print_packages(&packages, format)
        }
    }
}

/// Run a blocking scan off the async runtime
async fn scan<T, F>(f: F, token: CancellationToken) -> FetchResult<T>
where
    T: Send + 'static,
    F: FnOnce(&CancellationToken) -> FetchResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&token))
        .await
        .map_err(|e| FetchError::Internal(format!("scan task failed: {}", e)))?
}

/// Packages of a feed in whichever layout it uses
fn list_packages(root: &str, id: Option<&str>, token: &CancellationToken) -> FetchResult<Vec<LocalPackageInfo>> {
    let packages = match (local_folder::get_local_feed_type(root, token)?, id) {
        (FeedType::FileSystemV3, Some(id)) => local_folder::get_packages_v3_by_id(root, id, token)?,
        (FeedType::FileSystemV3, None) => local_folder::get_packages_v3(root, token)?,
        (_, Some(id)) => local_folder::get_packages_v2_by_id(root, id, token)?,
        (_, None) => local_folder::get_packages_v2(root, token)?,
    };
    Ok(local_folder::get_distinct_packages(packages))
}

fn print_packages(packages: &[LocalPackageInfo], format: OutputFormat) -> FetchResult<()> {
    if packages.is_empty() {
        ui::step_info(&UiContext::detect(), "No packages found.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => {
            println!("{:<40} {:<20} {:<20}", "ID", "VERSION", "MODIFIED");
            println!("{}", "-".repeat(80));
            for package in packages {
                println!(
                    "{:<40} {:<20} {:<20}",
                    package.identity.id,
                    package.identity.version.to_string(),
                    package.last_write_time.format("%Y-%m-%d %H:%M").to_string()
                );
            }
            println!();
            println!("Total: {} package(s)", packages.len());
        }
        OutputFormat::Json => {
            #[derive(serde::Serialize)]
            struct PackageJson {
                id: String,
                version: String,
                path: String,
                last_write_time: String,
            }

            let json: Vec<PackageJson> = packages
                .iter()
                .map(|p| PackageJson {
                    id: p.identity.id.clone(),
                    version: p.identity.version.to_normalized_string(),
                    path: p.path.display().to_string(),
                    last_write_time: p.last_write_time.to_rfc3339(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Plain => {
            for package in packages {
                println!("{}", package.path.display());
            }
        }
    }

    Ok(())
}
