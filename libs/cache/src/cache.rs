//! Image cache with oldest-first eviction.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use potd_archive::{ImageDownloader, ImageMetadata};
use tracing::{debug, info};

use crate::error::CacheError;
use crate::manifest;
use crate::mutation::MutationPipeline;

/// Manifest file name used by [`ImageCache::open_in`].
pub const MANIFEST_FILE_NAME: &str = "cache.json";

/// Bounded cache of image files plus the manifest that lists them.
///
/// The index keeps insertion order. Eviction picks the oldest `source_date`,
/// and among equal dates the entry that was inserted first.
#[derive(Debug)]
pub struct ImageCache {
    directory: PathBuf,
    manifest_path: PathBuf,
    max_entries: usize,
    index: Vec<ImageMetadata>,
}

impl ImageCache {
    /// Open a cache rooted at `directory`, creating it if needed.
    ///
    /// A missing or unreadable manifest yields an empty cache. Records whose
    /// image file is gone are dropped from the index (the manifest on disk is
    /// left alone until the next write).
    pub fn open(
        directory: impl AsRef<Path>,
        manifest_path: impl AsRef<Path>,
        max_entries: usize,
    ) -> Result<Self, CacheError> {
        if max_entries == 0 {
            return Err(CacheError::InvalidCapacity(max_entries));
        }

        let directory = directory.as_ref();
        if !directory.exists() {
            fs::create_dir_all(directory)?;
        }

        let mut cache = Self {
            directory: std::path::absolute(directory)?,
            manifest_path: manifest_path.as_ref().to_path_buf(),
            max_entries,
            index: Vec::new(),
        };
        cache.reload();

        info!(
            directory = %cache.directory.display(),
            count = cache.index.len(),
            max_entries,
            "Opened image cache"
        );

        Ok(cache)
    }

    /// Open a cache whose manifest lives inside `directory`.
    pub fn open_in(directory: impl AsRef<Path>, max_entries: usize) -> Result<Self, CacheError> {
        let directory = directory.as_ref();
        Self::open(directory, directory.join(MANIFEST_FILE_NAME), max_entries)
    }

    /// Cache directory (absolute).
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Manifest file path.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Capacity of the cache.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of indexed images.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Path where the file for `image` is stored.
    ///
    /// Only meaningful for IDs accepted by [`is_valid_image_id`]; cached
    /// records always are.
    pub fn image_path(&self, image: &ImageMetadata) -> PathBuf {
        self.directory.join(&image.id)
    }

    /// True if `image` is indexed and its file is on disk.
    pub fn contains(&self, image: &ImageMetadata) -> bool {
        is_valid_image_id(&image.id)
            && self.index.iter().any(|cached| cached.same_image(image))
            && self.image_path(image).is_file()
    }

    /// Newest cached image by source date.
    pub fn latest(&self) -> Option<&ImageMetadata> {
        self.index.iter().max_by_key(|image| image.source_date)
    }

    /// Cached images ordered oldest to newest.
    pub fn entries(&self) -> Vec<&ImageMetadata> {
        let mut entries: Vec<_> = self.index.iter().collect();
        entries.sort_by_key(|image| image.source_date);
        entries
    }

    /// Download `image` and add it to the cache.
    ///
    /// Returns `Ok(false)` without touching the network if the image is
    /// already cached. Otherwise makes room by evicting the oldest entries,
    /// downloads (through `pipeline` when given), records the image and
    /// rewrites the manifest.
    ///
    /// IDs that are not a single plain file name are rejected before anything
    /// is evicted or written.
    pub async fn download_and_cache(
        &mut self,
        image: &ImageMetadata,
        downloader: &dyn ImageDownloader,
        pipeline: Option<&MutationPipeline>,
    ) -> Result<bool, CacheError> {
        if !is_valid_image_id(&image.id) {
            return Err(CacheError::InvalidImageId(image.id.clone()));
        }

        if self.contains(image) {
            debug!(id = %image.id, "Image already cached");
            return Ok(false);
        }

        // A record whose file vanished is the same image; replace it rather
        // than let it hold a slot.
        self.index.retain(|cached| !cached.same_image(image));

        // Manifest is written once below.
        while self.index.len() + 1 > self.max_entries {
            if self.evict_oldest()?.is_none() {
                break;
            }
        }

        let final_path = self.image_path(image);
        match pipeline {
            Some(pipeline) => {
                let temp_path = manifest::temp_sibling(&final_path);
                downloader.download_to(image, &temp_path).await?;

                // Decoding and re-encoding is CPU bound.
                let task = {
                    let pipeline = pipeline.clone();
                    let image = image.clone();
                    let temp_path = temp_path.clone();
                    let final_path = final_path.clone();
                    tokio::task::spawn_blocking(move || {
                        pipeline.run(&temp_path, &image, &final_path)
                    })
                };

                if let Err(e) = task.await.map_err(CacheError::from).and_then(|r| r) {
                    fs::remove_file(&temp_path).ok();
                    return Err(e);
                }
                fs::remove_file(&temp_path)?;
            }
            None => {
                downloader.download_to(image, &final_path).await?;
            }
        }

        self.index.push(image.clone());
        self.persist()?;

        info!(
            id = %image.id,
            source_date = %image.source_date,
            count = self.index.len(),
            "Cached image"
        );

        Ok(true)
    }

    /// Remove the oldest entry and its file. Does not persist.
    fn evict_oldest(&mut self) -> Result<Option<ImageMetadata>, CacheError> {
        let Some(position) = self
            .index
            .iter()
            .enumerate()
            .min_by_key(|(_, image)| image.source_date)
            .map(|(position, _)| position)
        else {
            return Ok(None);
        };

        let path = self.image_path(&self.index[position]);
        if path.exists() {
            fs::remove_file(&path)?;
        }

        let evicted = self.index.remove(position);
        info!(
            id = %evicted.id,
            source_date = %evicted.source_date,
            "Evicted image"
        );

        Ok(Some(evicted))
    }

    /// Rebuild the index from the manifest, pruning records without files.
    fn reload(&mut self) {
        self.index.clear();

        let Some(images) = manifest::load(&self.manifest_path) else {
            return;
        };

        let mut seen = HashSet::new();
        for image in images {
            if !seen.insert(image.id.clone()) {
                debug!(id = %image.id, "Skipping duplicate manifest record");
                continue;
            }
            if !is_valid_image_id(&image.id) {
                debug!(id = %image.id, "Dropping record with unusable image ID");
                continue;
            }
            if !self.image_path(&image).is_file() {
                debug!(id = %image.id, "Pruning record without image file");
                continue;
            }
            self.index.push(image);
        }
    }

    fn persist(&self) -> Result<(), CacheError> {
        manifest::save(&self.manifest_path, &self.index)
    }
}

/// True if `id` names a single file directly inside a directory.
pub fn is_valid_image_id(id: &str) -> bool {
    if id.contains(['/', '\\']) {
        return false;
    }

    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
