//! Latest command - print the path of the newest cached image.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use potd_archive::ImageMetadata;
use serde::Serialize;
use tracing::warn;

use crate::error::CliError;
use crate::output::{print_single, OutputFormat};

use super::fetch::fetch_into_cache;
use super::CommandContext;

/// Print the newest cached image.
#[derive(Debug, Args)]
pub struct LatestCommand {
    /// Fetch the current image first. Without it only the cache is consulted.
    #[arg(short, long)]
    fetch: bool,

    /// Suppress errors from fetching and from an empty cache.
    #[arg(short = 'x', long)]
    no_error: bool,
}

#[derive(Debug, Serialize)]
struct LatestOutput<'a> {
    path: PathBuf,
    image: &'a ImageMetadata,
}

impl LatestCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let mut cache = ctx.open_cache()?;

        if self.fetch {
            match fetch_into_cache(&ctx, &mut cache, 1, None, false).await {
                Ok(_) => {}
                Err(e) if self.no_error => {
                    warn!(error = %e, "Fetch failed, falling back to cached images");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let Some(image) = cache.latest() else {
            if self.no_error {
                return Ok(());
            }
            return Err(CliError::EmptyCache.into());
        };

        let path = cache.image_path(image);
        match ctx.format {
            OutputFormat::Json => print_single(&LatestOutput { path, image }),
            OutputFormat::Table => println!("{}", path.display()),
        }

        Ok(())
    }
}
