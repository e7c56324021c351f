//! Error types for cache operations.

use std::io;

use potd_archive::ArchiveError;
use thiserror::Error;

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Downloading the image failed.
    #[error("download failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The manifest could not be serialized.
    #[error("manifest serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Decoding, transforming or encoding an image failed.
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// The image ID is not usable as a file name inside the cache directory.
    #[error("image ID {0:?} is not a plain file name")]
    InvalidImageId(String),

    /// A caption font could not be parsed.
    #[error("invalid font: {0}")]
    Font(#[from] ab_glyph::InvalidFont),

    /// A blocking task running the mutation pipeline panicked or was cancelled.
    #[error("image processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A cache must be able to hold at least one image.
    #[error("cache capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),
}

impl CacheError {
    /// Returns true if the remote service caused the failure.
    pub fn is_remote(&self) -> bool {
        matches!(self, CacheError::Archive(e) if e.is_remote())
    }
}
