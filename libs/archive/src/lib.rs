//! # potd-archive
//!
//! Client for the image-of-the-day archive service.
//!
//! ## Overview
//!
//! - [`ArchiveClient::fetch_latest`] pages through the archive endpoint in
//!   batches and returns the newest `n` records, oldest first
//! - [`ImageDownloader`] streams the bytes of one image to a local file
//! - [`ImageMetadata`] is the normalized record shared with the cache
//!
//! The service only exposes the last [`MAX_FETCHABLE`] days, and answers at
//! most [`BATCH_SIZE`] records per request.

mod client;
mod error;
mod metadata;

pub use client::{ArchiveClient, ArchiveConfig, ImageDownloader, BATCH_SIZE, MAX_FETCHABLE};
pub use error::ArchiveError;
pub use metadata::{ImageMetadata, DEFAULT_RESOLUTION};
