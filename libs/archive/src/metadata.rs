//! Image metadata and the wire records it is built from.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// Resolution the archive's `url` field points at.
pub const DEFAULT_RESOLUTION: &str = "1920x1080";

/// Metadata about one image-of-the-day.
///
/// `id` is the identity: two records with the same `id` describe the same
/// image no matter how the other fields differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Image ID, taken from the `id` query parameter of the image URI.
    pub id: String,

    /// Date the service attributes to the image.
    pub source_date: NaiveDate,

    /// When the image was first seen locally.
    pub discovered_at: DateTime<Utc>,

    /// Title given by the artist.
    pub title: String,

    /// Raw copyright string, including the trailing attribution.
    pub copyright: String,

    /// Copyright text without the trailing parenthesized attribution.
    pub descriptive_text: String,

    /// Absolute URI of the default resolution image.
    pub image_uri: String,

    /// Absolute URI prefix; append `_{RESOLUTION}.jpg` to select a size.
    #[serde(default)]
    pub base_uri: String,
}

impl ImageMetadata {
    /// Returns true if both records describe the same image.
    pub fn same_image(&self, other: &ImageMetadata) -> bool {
        self.id == other.id
    }

    /// URI for a specific resolution, e.g. `UHD` or `1920x1200`.
    pub fn uri_for_resolution(&self, resolution: &str) -> String {
        format!("{}_{}.jpg", self.base_uri, resolution)
    }
}

/// Response body of the archive endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ArchiveResponse {
    #[serde(default)]
    pub images: Vec<RawImage>,
}

/// One image record as the service sends it.
///
/// `url` and `urlbase` are host-relative paths.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawImage {
    pub startdate: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub urlbase: Option<String>,
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub title: String,
}

impl RawImage {
    /// Normalize into [`ImageMetadata`], resolving paths against `image_host`.
    pub fn into_metadata(
        self,
        image_host: &Url,
        discovered_at: DateTime<Utc>,
    ) -> Result<ImageMetadata, ArchiveError> {
        let source_date = parse_start_date(&self.startdate)?;

        let path = match (&self.url, &self.urlbase) {
            (Some(url), _) if !url.is_empty() => url.clone(),
            (_, Some(base)) if !base.is_empty() => format!("{base}_{DEFAULT_RESOLUTION}.jpg"),
            _ => return Err(ArchiveError::MissingImagePath(self.startdate)),
        };
        let image_uri = resolve(image_host, &path)?;

        let base_uri = match &self.urlbase {
            Some(base) if !base.is_empty() => resolve(image_host, base)?.to_string(),
            _ => String::new(),
        };

        Ok(ImageMetadata {
            id: extract_id(&image_uri),
            source_date,
            discovered_at,
            title: self.title,
            descriptive_text: descriptive_text(&self.copyright),
            copyright: self.copyright,
            image_uri: image_uri.to_string(),
            base_uri,
        })
    }
}

/// Parse the service's fixed `YYYYMMDD` date.
pub(crate) fn parse_start_date(value: &str) -> Result<NaiveDate, ArchiveError> {
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ArchiveError::InvalidDate(value.to_string()));
    }

    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|_| ArchiveError::InvalidDate(value.to_string()))
}

fn resolve(host: &Url, path: &str) -> Result<Url, ArchiveError> {
    host.join(path)
        .map_err(|e| ArchiveError::InvalidUri(format!("{path}: {e}")))
}

/// Value of the `id` query parameter, or an empty string if there is none.
pub(crate) fn extract_id(uri: &Url) -> String {
    uri.query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case("id"))
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

/// Strip the trailing `(...)` attribution from a copyright string.
pub(crate) fn descriptive_text(copyright: &str) -> String {
    match copyright.rfind('(') {
        Some(idx) => copyright[..idx].trim().to_string(),
        None => copyright.trim().to_string(),
    }
}
