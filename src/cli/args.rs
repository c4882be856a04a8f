//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// nuget-fetch - NuGet package download and caching
///
/// Lists, downloads and installs packages from flat container feeds
/// through an HTTP cache and the global packages folder.
#[derive(Parser, Debug)]
#[command(name = "nuget-fetch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "NUGET_FETCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Package source URL, overriding the configured sources
    #[arg(short, long, global = true)]
    pub source: Option<String>,

    /// Bypass the HTTP cache
    #[arg(long, global = true)]
    pub no_cache: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the versions of a package
    Versions(VersionsArgs),

    /// Install a package into the global packages folder
    Install(InstallArgs),

    /// Download a nupkg to a file
    Download(DownloadArgs),

    /// Inspect a local feed
    Local(LocalArgs),

    /// Manage the HTTP cache and global packages folder
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the versions command
#[derive(Parser, Debug)]
pub struct VersionsArgs {
    /// Package id
    pub id: String,

    /// Include prerelease versions
    #[arg(long)]
    pub prerelease: bool,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Package id
    pub id: String,

    /// Package version
    #[arg(id = "package_version", value_name = "VERSION")]
    pub version: String,

    /// Download into this directory instead of the global packages folder
    #[arg(long, value_name = "DIR")]
    pub direct: Option<PathBuf>,
}

/// Arguments for the download command
#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// Package id
    pub id: String,

    /// Package version
    #[arg(id = "package_version", value_name = "VERSION")]
    pub version: String,

    /// Destination file (defaults to `<id>.<version>.nupkg` in the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the local command
#[derive(Parser, Debug)]
pub struct LocalArgs {
    /// Subcommand for local feeds
    #[command(subcommand)]
    pub action: LocalAction,
}

/// Local feed subcommands
#[derive(Subcommand, Debug)]
pub enum LocalAction {
    /// List packages in a local feed
    List {
        /// Feed root (path or file:// URI)
        root: String,

        /// Only packages with this id
        #[arg(long)]
        id: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Detect the layout of a local feed
    Type {
        /// Feed root (path or file:// URI)
        root: String,
    },
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache locations
    Path,

    /// Delete cached data
    #[command(group(clap::ArgGroup::new("target").required(true).args(["http", "packages", "all"])))]
    Clear {
        /// Clear the HTTP cache
        #[arg(long)]
        http: bool,

        /// Clear the global packages folder
        #[arg(long)]
        packages: bool,

        /// Clear both
        #[arg(long, conflicts_with_all = ["http", "packages"])]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_versions() {
        let cli = Cli::parse_from(["nuget-fetch", "versions", "Newtonsoft.Json"]);
        match cli.command {
            Commands::Versions(args) => {
                assert_eq!(args.id, "Newtonsoft.Json");
                assert!(!args.prerelease);
                assert!(matches!(args.format, OutputFormat::Plain));
            }
            _ => panic!("expected Versions command"),
        }
    }

    #[test]
    fn cli_parses_install_direct() {
        let cli = Cli::parse_from(["nuget-fetch", "install", "a", "1.0.0", "--direct", "/tmp/out"]);
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.version, "1.0.0");
                assert_eq!(args.direct, Some(PathBuf::from("/tmp/out")));
            }
            _ => panic!("expected Install command"),
        }
    }

    #[test]
    fn cli_parses_download_output() {
        let cli = Cli::parse_from(["nuget-fetch", "download", "a", "1.0.0", "-o", "a.nupkg"]);
        match cli.command {
            Commands::Download(args) => assert_eq!(args.output, Some(PathBuf::from("a.nupkg"))),
            _ => panic!("expected Download command"),
        }
    }

    #[test]
    fn cli_parses_local_type() {
        let cli = Cli::parse_from(["nuget-fetch", "local", "type", "/feed"]);
        match cli.command {
            Commands::Local(LocalArgs {
                action: LocalAction::Type { root },
            }) => assert_eq!(root, "/feed"),
            _ => panic!("expected Local Type command"),
        }
    }

    #[test]
    fn cli_cache_clear_requires_target() {
        assert!(Cli::try_parse_from(["nuget-fetch", "cache", "clear"]).is_err());
        assert!(Cli::try_parse_from(["nuget-fetch", "cache", "clear", "--all", "--http"]).is_err());
        let cli = Cli::parse_from(["nuget-fetch", "cache", "clear", "--http", "--yes"]);
        match cli.command {
            Commands::Cache(CacheArgs {
                action: CacheAction::Clear { http, packages, all, yes },
            }) => {
                assert!(http && yes);
                assert!(!packages && !all);
            }
            _ => panic!("expected Cache Clear command"),
        }
    }

    #[test]
    fn cli_global_flags() {
        let cli = Cli::parse_from([
            "nuget-fetch",
            "versions",
            "a",
            "--source",
            "https://feed.example.org/flat/",
            "--no-cache",
        ]);
        assert_eq!(cli.source.as_deref(), Some("https://feed.example.org/flat/"));
        assert!(cli.no_cache);
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["nuget-fetch", "config"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["nuget-fetch", "-v", "config"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["nuget-fetch", "-vv", "config"]);
        assert_eq!(cli.verbose, 2);
    }
}
