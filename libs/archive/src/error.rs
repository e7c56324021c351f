//! Error types for archive operations.

use std::io;

use thiserror::Error;

/// Errors from fetching metadata or downloading images.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The requested number of records is outside `[1, max]`.
    #[error("requested {requested} images, value must be in the range [1-{max}]")]
    InvalidRange { requested: usize, max: usize },

    /// Transport-level failure talking to the service.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The response body could not be deserialized.
    #[error("failed to parse response from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// A record carried a `startdate` that is not `YYYYMMDD`.
    #[error("invalid start date: {0:?}")]
    InvalidDate(String),

    /// The service returned fewer records than a batch asked for.
    #[error("{url} returned {received} records, expected {requested}")]
    ShortBatch {
        url: String,
        requested: usize,
        received: usize,
    },

    /// A record carried neither `url` nor `urlbase`.
    #[error("record with startdate {0:?} has neither url nor urlbase")]
    MissingImagePath(String),

    /// A record carried an image path that does not resolve to a URI.
    #[error("invalid image URI: {0}")]
    InvalidUri(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ArchiveError {
    /// Returns true if the failure came from the remote service or its payload.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ArchiveError::Http(_)
                | ArchiveError::Status { .. }
                | ArchiveError::Parse { .. }
                | ArchiveError::ShortBatch { .. }
                | ArchiveError::MissingImagePath(_)
                | ArchiveError::InvalidDate(_)
                | ArchiveError::InvalidUri(_)
        )
    }

    /// Returns true if the caller asked for an unsupported number of records.
    pub fn is_invalid_range(&self) -> bool {
        matches!(self, ArchiveError::InvalidRange { .. })
    }
}
