//! Cache command - show and clear the HTTP cache and global packages folder

use crate::cli::args::{CacheAction, CacheArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{FetchError, FetchResult};
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> FetchResult<()> {
    match args.action {
        CacheAction::Path => {
            show_paths(config);
            Ok(())
        }
        CacheAction::Clear {
            http,
            packages,
            all,
            yes,
        } => {
            let targets = clear_targets(config, http || all, packages || all);
            let ctx = UiContext::detect().with_auto_yes(yes);
            clear(&ctx, &targets).await
        }
    }
}

fn show_paths(config: &Config) {
    let ctx = UiContext::detect();
    ui::key_value(
        &ctx,
        "global-packages",
        &ConfigManager::global_packages_folder(config).display().to_string(),
    );
    ui::key_value(&ctx, "http-cache", &ConfigManager::http_cache_dir(config).display().to_string());
    ui::key_value(&ctx, "temp", &ConfigManager::scratch_dir().display().to_string());
}

fn clear_targets(config: &Config, http: bool, packages: bool) -> Vec<(&'static str, PathBuf)> {
    let mut targets = Vec::new();
    if http {
        targets.push(("HTTP cache", ConfigManager::http_cache_dir(config)));
    }
    if packages {
        targets.push(("global packages folder", ConfigManager::global_packages_folder(config)));
    }
    targets
}

async fn clear(ctx: &UiContext, targets: &[(&'static str, PathBuf)]) -> FetchResult<()> {
    let existing: Vec<&(&str, PathBuf)> = targets.iter().filter(|(_, path)| path.exists()).collect();
    if existing.is_empty() {
        ui::step_info(ctx, "Nothing to clear.");
        return Ok(());
    }

    ui::section(ctx, "This will delete:");
    for (name, path) in &existing {
        ui::key_value(ctx, name, &path.display().to_string());
    }

    if !ui::confirm(ctx, "Are you sure?", false).await? {
        ui::outro_warn(ctx, "Aborted.");
        return Ok(());
    }

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start("Clearing caches...");
    for (name, path) in existing {
        if let Err(e) = remove_dir(path).await {
            spinner.stop_error(&format!("Could not clear the {}", name));
            return Err(e);
        }
    }
    spinner.stop("Caches cleared");

    Ok(())
}

async fn remove_dir(path: &Path) -> FetchResult<()> {
    debug!("Removing {}", path.display());
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FetchError::io(format!("removing {}", path.display()), e)),
    }
}
