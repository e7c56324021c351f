//! List command - show the images currently in the cache.

use anyhow::Result;
use clap::Args;
use potd_archive::ImageMetadata;
use serde::Serialize;
use tabled::Tabled;

use crate::output::print_output;

use super::CommandContext;

/// List cached images, oldest first.
#[derive(Debug, Args)]
pub struct ListCommand {}

/// One cached image.
#[derive(Debug, Serialize, Tabled)]
struct CachedImageRow {
    #[tabled(rename = "Date")]
    source_date: String,

    #[tabled(rename = "ID")]
    id: String,

    #[tabled(rename = "Title")]
    title: String,

    #[tabled(rename = "Path")]
    path: String,
}

impl CachedImageRow {
    fn new(image: &ImageMetadata, path: String) -> Self {
        Self {
            source_date: image.source_date.to_string(),
            id: image.id.clone(),
            title: image.title.clone(),
            path,
        }
    }
}

impl ListCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let cache = ctx.open_cache()?;

        let rows: Vec<CachedImageRow> = cache
            .entries()
            .into_iter()
            .map(|image| CachedImageRow::new(image, cache.image_path(image).display().to_string()))
            .collect();

        print_output(&rows, ctx.format);
        Ok(())
    }
}
