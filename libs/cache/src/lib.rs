//! # potd-cache
//!
//! Bounded local cache of downloaded images.
//!
//! ## Layout
//!
//! One file per image, named by the image ID, directly inside the cache
//! directory, plus a JSON manifest listing the cached records.
//!
//! ## Guarantees
//!
//! - The index never holds more than `max_entries` records once an operation
//!   returns
//! - Eviction removes the entry with the oldest source date, one at a time
//! - An image is downloaded at most once per ID while its file is present
//! - Records whose file went missing are dropped when the cache is opened
//!
//! A single process is expected to own the directory; there is no locking.

mod cache;
mod error;
mod manifest;
mod mutation;

pub use cache::{is_valid_image_id, ImageCache, MANIFEST_FILE_NAME};
pub use error::CacheError;
pub use mutation::{DescriptiveCaption, Mutation, MutationPipeline, Resize};
