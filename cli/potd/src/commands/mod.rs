//! CLI commands.

mod fetch;
mod latest;
mod list;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use potd_archive::ArchiveClient;
use potd_cache::ImageCache;

use crate::config::Config;
use crate::error::CliError;
use crate::output::OutputFormat;

/// potd - cache image-of-the-day wallpapers locally.
#[derive(Debug, Parser)]
#[command(name = "potd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Path to a config file (defaults to the platform config directory).
    #[arg(long, global = true, env = "POTD_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch and locally cache the latest images.
    Fetch(fetch::FetchCommand),

    /// Print the local path of the newest cached image.
    Latest(latest::LatestCommand),

    /// List cached images.
    List(list::ListCommand),
}

impl Cli {
    /// Whether debug logging was requested.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        let ctx = CommandContext {
            config,
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Fetch(cmd) => cmd.run(ctx).await,
            Commands::Latest(cmd) => cmd.run(ctx).await,
            Commands::List(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Open the configured image cache.
    pub fn open_cache(&self) -> Result<ImageCache, CliError> {
        Ok(ImageCache::open_in(
            &self.config.cache_directory,
            self.config.max_cache_size,
        )?)
    }

    /// Create a client for the archive service.
    pub fn archive_client(&self) -> Result<ArchiveClient, CliError> {
        Ok(ArchiveClient::new(self.config.archive_config())?)
    }
}
