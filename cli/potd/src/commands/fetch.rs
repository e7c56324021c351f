//! Fetch command - download the latest images into the cache.

use anyhow::Result;
use clap::Args;
use potd_archive::MAX_FETCHABLE;
use potd_cache::{DescriptiveCaption, ImageCache, MutationPipeline, Resize};
use serde::Serialize;
use tabled::Tabled;

use crate::config::Config;
use crate::error::CliError;
use crate::output::{print_info, print_output, print_success, OutputFormat};

use super::CommandContext;

/// Fetch and cache images.
#[derive(Debug, Args)]
pub struct FetchCommand {
    /// The number of images to fetch.
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Suppress output from this operation.
    #[arg(short, long)]
    silent: bool,

    /// Resize cached images to WIDTHxHEIGHT.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimensions)]
    resize: Option<(u32, u32)>,

    /// Draw the image description in the bottom-left corner.
    #[arg(long)]
    caption: bool,
}

impl FetchCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let pipeline = self.pipeline(&ctx.config)?;
        let mut cache = ctx.open_cache()?;

        let rows = fetch_into_cache(&ctx, &mut cache, self.count, pipeline.as_ref(), !self.silent)
            .await?;

        if !self.silent && ctx.format == OutputFormat::Json {
            print_output(&rows, ctx.format);
        }

        Ok(())
    }

    /// Post-processing requested on the command line, if any.
    fn pipeline(&self, config: &Config) -> Result<Option<MutationPipeline>, CliError> {
        let mut pipeline = MutationPipeline::new();
        if let Some((width, height)) = self.resize {
            pipeline = pipeline.with(Resize::new(width, height));
        }
        if self.caption {
            let caption = match &config.caption_font {
                Some(path) => DescriptiveCaption::from_font_file(path)?,
                None => DescriptiveCaption::new()?,
            };
            pipeline = pipeline.with(caption);
        }

        Ok((!pipeline.is_empty()).then_some(pipeline))
    }
}

/// Outcome for one fetched image.
#[derive(Debug, Serialize, Tabled)]
pub struct FetchRow {
    #[tabled(rename = "Date")]
    pub source_date: String,

    #[tabled(rename = "ID")]
    pub id: String,

    #[tabled(rename = "Status")]
    pub status: &'static str,
}

/// Fetch the latest `count` images and cache them oldest first.
///
/// With `report` set and table output, prints one line per image as it is
/// processed.
pub(super) async fn fetch_into_cache(
    ctx: &CommandContext,
    cache: &mut ImageCache,
    count: usize,
    pipeline: Option<&MutationPipeline>,
    report: bool,
) -> Result<Vec<FetchRow>, CliError> {
    if !(1..=MAX_FETCHABLE).contains(&count) {
        return Err(CliError::user(format!(
            "The number of images to fetch should be in the range [1-{MAX_FETCHABLE}]."
        )));
    }

    let client = ctx.archive_client()?;
    let images = client.fetch_latest(count).await?;

    let mut rows = Vec::with_capacity(images.len());
    for image in &images {
        let cached = cache.download_and_cache(image, &client, pipeline).await?;

        if report && ctx.format == OutputFormat::Table {
            if cached {
                print_success(&format!("Cached image {}", image.id));
            } else {
                print_info(&format!("Image {} was already cached", image.id));
            }
        }

        rows.push(FetchRow {
            source_date: image.source_date.to_string(),
            id: image.id.clone(),
            status: if cached { "cached" } else { "already-cached" },
        });
    }

    Ok(rows)
}

/// Parse `WIDTHxHEIGHT`.
fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;

    let parse = |part: &str| -> Result<u32, String> {
        match part.trim().parse::<u32>() {
            Ok(0) => Err("dimensions must be greater than zero".to_string()),
            Ok(n) => Ok(n),
            Err(e) => Err(format!("invalid dimension {part:?}: {e}")),
        }
    };

    Ok((parse(width)?, parse(height)?))
}
