//! nuget-fetch CLI entry point

use clap::Parser;
use console::style;
use nuget_fetch::cli::{Cli, Commands, GlobalOptions};
use nuget_fetch::config::{Config, ConfigManager};
use nuget_fetch::error::FetchResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> FetchResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Using config {}", config_manager.path().display());

    let options = GlobalOptions::from_cli(&cli);
    match cli.command {
        Commands::Versions(args) => nuget_fetch::cli::commands::versions(args, &config, &options).await,
        Commands::Install(args) => nuget_fetch::cli::commands::install(args, &config, &options).await,
        Commands::Download(args) => nuget_fetch::cli::commands::download(args, &config, &options).await,
        Commands::Local(args) => nuget_fetch::cli::commands::local(args).await,
        Commands::Cache(args) => nuget_fetch::cli::commands::cache(args, &config).await,
        Commands::Config(args) => nuget_fetch::cli::commands::config(args, &config, &config_manager).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug. Logs go to stderr so stdout stays parseable.
fn init_logging(verbose: u8, config: &Config) {
    let level = match verbose {
        0 if config.general.verbose => "info",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::new(format!("nuget_fetch={level}"));

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}
