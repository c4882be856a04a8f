//! Command-line front end

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};

use crate::config::{Config, ConfigManager, EnhancedRetrySettings};
use crate::context::SourceCacheContext;
use crate::error::{FetchError, FetchResult};
use crate::http::{HttpSource, ReqwestTransport};
use crate::remote::RemoteFindPackageByIdResource;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Flags shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub source: Option<String>,
    pub no_cache: bool,
}

impl GlobalOptions {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            source: cli.source.clone(),
            no_cache: cli.no_cache,
        }
    }
}

/// Everything a command needs to talk to the configured feed
pub struct Feed {
    pub resource: RemoteFindPackageByIdResource,
    pub http_source: Arc<HttpSource>,
    pub cache_context: SourceCacheContext,
    pub global_packages_folder: PathBuf,
    pub token: CancellationToken,
}

impl Feed {
    pub fn open(config: &Config, options: &GlobalOptions) -> FetchResult<Self> {
        let urls = match options.source {
            Some(ref url) => vec![url.clone()],
            None => config.source_urls(),
        };
        let primary = urls
            .first()
            .cloned()
            .ok_or_else(|| FetchError::User("No package source configured".to_string()))?;

        let retry = EnhancedRetrySettings::from_env();
        let transport = Arc::new(ReqwestTransport::new(&config.http.user_agent)?);
        let http_source = Arc::new(HttpSource::from_config(
            primary,
            transport,
            ConfigManager::http_cache_dir(config),
            config,
            &retry,
        ));
        let resource = RemoteFindPackageByIdResource::new(&urls, Arc::clone(&http_source))?
            .with_retry_settings(&retry);

        let cache_context = SourceCacheContext::from_config(config).with_no_cache(options.no_cache);
        let global_packages_folder = ConfigManager::global_packages_folder(config);
        debug!(
            source = %http_source.source(),
            packages = %global_packages_folder.display(),
            "Opened feed"
        );

        Ok(Self {
            resource,
            http_source,
            cache_context,
            global_packages_folder,
            token: cancel_on_ctrl_c(),
        })
    }
}

/// Token cancelled when the user presses Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, cancelling");
                child.cancel();
            }
            Err(e) => debug!("Ctrl-C handler unavailable: {}", e),
        }
    });
    token
}
