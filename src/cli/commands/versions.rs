//! Versions command - list the versions of a package

use crate::cli::args::{OutputFormat, VersionsArgs};
use crate::cli::{Feed, GlobalOptions};
use crate::config::Config;
use crate::error::FetchResult;
use crate::ui::{self, TaskSpinner, UiContext};
use crate::version::NuGetVersion;

/// Execute the versions command
pub async fn execute(args: VersionsArgs, config: &Config, options: &GlobalOptions) -> FetchResult<()> {
    let ctx = UiContext::detect();
    let feed = Feed::open(config, options)?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Listing versions of {}...", args.id));
    let versions = match feed
        .resource
        .get_all_versions(&args.id, &feed.cache_context, &feed.token)
        .await
    {
        Ok(versions) => versions,
        Err(e) => {
            spinner.stop_error(&format!("Could not list {}", args.id));
            return Err(e);
        }
    };
    spinner.clear();

    let versions = filter_versions(versions, args.prerelease);
    if versions.is_empty() {
        ui::step_warn_hint(
            &ctx,
            &format!("No versions of '{}' found", args.id),
            feed.resource.source(),
        );
        return Ok(());
    }

    match args.format {
        OutputFormat::Json => {
            let strings: Vec<String> = versions.iter().map(|v| v.to_normalized_string()).collect();
            println!("{}", serde_json::to_string_pretty(&strings)?);
        }
        OutputFormat::Plain => {
            for version in &versions {
                println!("{}", version);
            }
        }
        OutputFormat::Table => {
            println!("{:<30} {:<10}", "VERSION", "PRERELEASE");
            println!("{}", "-".repeat(41));
            for version in &versions {
                let pre = if version.is_prerelease() { "yes" } else { "" };
                println!("{:<30} {:<10}", version.to_string(), pre);
            }
            println!();
            println!("Total: {} version(s)", versions.len());
        }
    }

    Ok(())
}

fn filter_versions(versions: Vec<NuGetVersion>, prerelease: bool) -> Vec<NuGetVersion> {
    versions
        .into_iter()
        .filter(|v| prerelease || !v.is_prerelease())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerelease_versions_hidden_by_default() {
        let versions: Vec<NuGetVersion> = ["1.0.0", "2.0.0-beta", "2.0.0"]
            .iter()
            .map(|v| NuGetVersion::parse(v).unwrap())
            .collect();

        let stable = filter_versions(versions.clone(), false);
        assert_eq!(stable.len(), 2);
        assert!(stable.iter().all(|v| !v.is_prerelease()));

        assert_eq!(filter_versions(versions, true).len(), 3);
    }
}
