//! HTTP client for the image-of-the-day archive.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use reqwest::{Client, Url};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::ArchiveError;
use crate::metadata::{ArchiveResponse, ImageMetadata, RawImage};

/// How far back the archive goes, even with batching.
pub const MAX_FETCHABLE: usize = 14;

/// Most records the archive endpoint returns in one call.
pub const BATCH_SIZE: usize = 7;

const ARCHIVE_PATH: &str = "/HPImageArchive.aspx";

/// Configuration for [`ArchiveClient`].
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Base URL of the metadata endpoint.
    pub base_url: String,
    /// Host that image paths are resolved against.
    pub image_host: String,
    /// Market code sent with every metadata request.
    pub market: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.bing.com".to_string(),
            image_host: "https://bing.com".to_string(),
            market: "en-US".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Streams image bytes to local files.
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    /// Write the bytes behind `image.image_uri` to `dest`, replacing any
    /// existing content. Returns the number of bytes written.
    async fn download_to(&self, image: &ImageMetadata, dest: &Path) -> Result<u64, ArchiveError>;
}

/// Archive client.
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    config: ArchiveConfig,
    image_host: Url,
    client: Client,
}

impl ArchiveClient {
    /// Create a new archive client.
    pub fn new(config: ArchiveConfig) -> Result<Self, ArchiveError> {
        let image_host = Url::parse(&config.image_host)
            .map_err(|e| ArchiveError::InvalidUri(format!("{}: {e}", config.image_host)))?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            config,
            image_host,
            client,
        })
    }

    /// Build the metadata endpoint URL.
    fn archive_url(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            ARCHIVE_PATH
        )
    }

    /// Metadata for the newest image.
    pub async fn fetch_current(&self) -> Result<Option<ImageMetadata>, ArchiveError> {
        Ok(self.fetch_latest(1).await?.pop())
    }

    /// Metadata for the newest `n` images, ordered oldest to newest.
    ///
    /// `n` must be in `[1, MAX_FETCHABLE]`. Batches are requested one after
    /// another; any failed batch fails the whole call. Exactly `n` records
    /// are returned: surplus records in a batch are dropped and a batch with
    /// too few records is an error.
    pub async fn fetch_latest(&self, n: usize) -> Result<Vec<ImageMetadata>, ArchiveError> {
        if n < 1 || n > MAX_FETCHABLE {
            return Err(ArchiveError::InvalidRange {
                requested: n,
                max: MAX_FETCHABLE,
            });
        }

        let mut raw_images = Vec::with_capacity(n);
        let mut remaining = n;
        let mut offset = 0;

        while remaining > 0 {
            let batch_size = remaining.min(BATCH_SIZE);
            let batch = self.fetch_batch(offset, batch_size).await?;
            raw_images.extend(batch);

            remaining -= batch_size;
            offset += batch_size;
        }

        let discovered_at = Utc::now();
        let mut images = raw_images
            .into_iter()
            .map(|raw| raw.into_metadata(&self.image_host, discovered_at))
            .collect::<Result<Vec<_>, _>>()?;

        // Stable: records sharing a date keep their response order.
        images.sort_by_key(|image| image.source_date);

        info!(requested = n, received = images.len(), "Fetched image metadata");

        Ok(images)
    }

    /// Fetch one page of exactly `size` raw records.
    async fn fetch_batch(&self, offset: usize, size: usize) -> Result<Vec<RawImage>, ArchiveError> {
        let url = self.archive_url();
        debug!(url = %url, offset, size, "Requesting metadata batch");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "js".to_string()),
                ("idx", offset.to_string()),
                ("n", size.to_string()),
                ("mkt", self.config.market.clone()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let parsed: ArchiveResponse =
            serde_json::from_slice(&body).map_err(|source| ArchiveError::Parse {
                url: url.clone(),
                source,
            })?;

        let mut images = parsed.images;
        if images.len() < size {
            return Err(ArchiveError::ShortBatch {
                url,
                requested: size,
                received: images.len(),
            });
        }
        if images.len() > size {
            debug!(url = %url, requested = size, received = images.len(), "Dropping surplus records");
            images.truncate(size);
        }

        Ok(images)
    }
}

#[async_trait]
impl ImageDownloader for ArchiveClient {
    async fn download_to(&self, image: &ImageMetadata, dest: &Path) -> Result<u64, ArchiveError> {
        debug!(id = %image.id, url = %image.image_uri, dest = %dest.display(), "Downloading image");

        let response = self.client.get(&image.image_uri).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Status {
                url: image.image_uri.clone(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut total_bytes = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            total_bytes += chunk.len() as u64;
        }
        file.flush().await?;

        info!(id = %image.id, size = total_bytes, "Image downloaded");

        Ok(total_bytes)
    }
}
