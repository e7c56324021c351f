//! Integration tests for the image cache lifecycle: add, evict, persist, reopen.

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rstest::rstest;
use tempfile::TempDir;

use potd_archive::{ArchiveError, ImageDownloader, ImageMetadata};
use potd_cache::{
    CacheError, ImageCache, Mutation, MutationPipeline, Resize, MANIFEST_FILE_NAME,
};

/// Serves a fixed body for every image and counts downloads.
struct StaticDownloader {
    body: Vec<u8>,
    calls: AtomicUsize,
}

impl StaticDownloader {
    fn new(body: &[u8]) -> Self {
        Self {
            body: body.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageDownloader for StaticDownloader {
    async fn download_to(&self, _image: &ImageMetadata, dest: &Path) -> Result<u64, ArchiveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        fs::write(dest, &self.body)?;
        Ok(self.body.len() as u64)
    }
}

/// Always fails as if the service returned 503.
struct FailingDownloader;

#[async_trait]
impl ImageDownloader for FailingDownloader {
    async fn download_to(&self, image: &ImageMetadata, _dest: &Path) -> Result<u64, ArchiveError> {
        Err(ArchiveError::Status {
            url: image.image_uri.clone(),
            status: 503,
        })
    }
}

fn image(id: &str, year: i32, month: u32, day: u32) -> ImageMetadata {
    ImageMetadata {
        id: id.to_string(),
        source_date: NaiveDate::from_ymd_opt(year, month, day).unwrap(),
        discovered_at: Utc::now(),
        title: format!("Title of {id}"),
        copyright: format!("About {id} (© Photographer)"),
        descriptive_text: format!("About {id}"),
        image_uri: format!("https://bing.com/th?id={id}"),
        base_uri: format!("https://bing.com/th?id={id}"),
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 200, 30])))
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_empty_directory() {
    let temp = TempDir::new().unwrap();
    let cache = ImageCache::open_in(temp.path(), 2).unwrap();

    assert!(cache.latest().is_none());
    assert!(!temp.path().join(MANIFEST_FILE_NAME).exists());
}

#[tokio::test]
async fn test_download_and_cache_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let mut cache = ImageCache::open_in(temp.path(), 5).unwrap();
    let downloader = StaticDownloader::new(b"bytes");
    let a = image("a.jpg", 2024, 1, 1);

    assert!(cache.download_and_cache(&a, &downloader, None).await.unwrap());
    assert!(!cache.download_and_cache(&a, &downloader, None).await.unwrap());

    assert_eq!(downloader.calls(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(files_in(temp.path()), vec!["a.jpg", MANIFEST_FILE_NAME]);

    let reopened = ImageCache::open_in(temp.path(), 5).unwrap();
    assert_eq!(reopened.len(), 1);
}

#[tokio::test]
async fn test_capacity_evicts_only_the_oldest() {
    let temp = TempDir::new().unwrap();
    let mut cache = ImageCache::open_in(temp.path(), 2).unwrap();
    let downloader = StaticDownloader::new(b"bytes");

    let a = image("a.jpg", 2024, 1, 1);
    let b = image("b.jpg", 2024, 1, 2);
    let c = image("c.jpg", 2024, 1, 3);

    cache.download_and_cache(&a, &downloader, None).await.unwrap();
    cache.download_and_cache(&b, &downloader, None).await.unwrap();
    assert!(cache.contains(&a));
    assert!(cache.contains(&b));

    cache.download_and_cache(&c, &downloader, None).await.unwrap();

    assert!(!cache.contains(&a));
    assert!(!cache.image_path(&a).exists());
    assert!(cache.contains(&b));
    assert!(cache.contains(&c));
    assert_eq!(cache.latest().unwrap().id, "c.jpg");
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(7)]
#[tokio::test]
async fn test_index_never_exceeds_capacity(#[case] max_entries: usize) {
    let temp = TempDir::new().unwrap();
    let mut cache = ImageCache::open_in(temp.path(), max_entries).unwrap();
    let downloader = StaticDownloader::new(b"bytes");

    // Out-of-order dates so eviction cannot rely on insertion order.
    let days = [9, 3, 14, 1, 7, 12, 5, 2, 11, 8];
    for day in days {
        let img = image(&format!("img{day}.jpg"), 2024, 2, day);
        cache.download_and_cache(&img, &downloader, None).await.unwrap();
        assert!(cache.len() <= max_entries);
        assert!(cache.contains(&img));
    }

    assert_eq!(cache.len(), max_entries);
    let reopened = ImageCache::open_in(temp.path(), max_entries).unwrap();
    assert_eq!(reopened.len(), max_entries);
}

#[tokio::test]
async fn test_eviction_removes_single_smallest_date() {
    let temp = TempDir::new().unwrap();
    let mut cache = ImageCache::open_in(temp.path(), 3).unwrap();
    let downloader = StaticDownloader::new(b"bytes");

    let b = image("b.jpg", 2024, 1, 5);
    let a = image("a.jpg", 2024, 1, 2);
    let c = image("c.jpg", 2024, 1, 9);
    for img in [&b, &a, &c] {
        cache.download_and_cache(img, &downloader, None).await.unwrap();
    }

    let d = image("d.jpg", 2024, 1, 3);
    cache.download_and_cache(&d, &downloader, None).await.unwrap();

    let ids: Vec<&str> = cache.entries().iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["d.jpg", "b.jpg", "c.jpg"]);
}

#[tokio::test]
async fn test_manifest_round_trip() {
    let temp = TempDir::new().unwrap();
    let downloader = StaticDownloader::new(b"bytes");
    let images = [
        image("a.jpg", 2024, 3, 1),
        image("b.jpg", 2024, 3, 2),
        image("c.jpg", 2024, 3, 3),
    ];

    let mut cache = ImageCache::open_in(temp.path(), 5).unwrap();
    for img in &images {
        cache.download_and_cache(img, &downloader, None).await.unwrap();
    }

    let reopened = ImageCache::open_in(temp.path(), 5).unwrap();
    let entries: Vec<ImageMetadata> = reopened.entries().into_iter().cloned().collect();
    assert_eq!(entries, images.to_vec());
}

#[tokio::test]
async fn test_missing_files_are_pruned_on_open() {
    let temp = TempDir::new().unwrap();
    let downloader = StaticDownloader::new(b"bytes");
    let a = image("a.jpg", 2024, 1, 1);
    let b = image("b.jpg", 2024, 1, 2);

    let mut cache = ImageCache::open_in(temp.path(), 5).unwrap();
    cache.download_and_cache(&a, &downloader, None).await.unwrap();
    cache.download_and_cache(&b, &downloader, None).await.unwrap();

    fs::remove_file(cache.image_path(&b)).unwrap();

    let reopened = ImageCache::open_in(temp.path(), 5).unwrap();
    assert_eq!(reopened.len(), 1);
    assert!(reopened.contains(&a));
    assert!(!reopened.contains(&b));
    assert_eq!(reopened.latest().unwrap().id, "a.jpg");
}

#[test]
fn test_corrupt_manifest_opens_empty() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(MANIFEST_FILE_NAME), "garbage").unwrap();
    fs::write(temp.path().join("a.jpg"), "bytes").unwrap();

    let cache = ImageCache::open_in(temp.path(), 5).unwrap();
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_separate_manifest_path() {
    let temp = TempDir::new().unwrap();
    let images_dir = temp.path().join("images");
    let manifest_path = temp.path().join("state").join("manifest.json");
    fs::create_dir_all(manifest_path.parent().unwrap()).unwrap();
    let downloader = StaticDownloader::new(b"bytes");
    let a = image("a.jpg", 2024, 1, 1);

    let mut cache = ImageCache::open(&images_dir, &manifest_path, 2).unwrap();
    cache.download_and_cache(&a, &downloader, None).await.unwrap();

    assert!(manifest_path.is_file());
    assert_eq!(files_in(&images_dir), vec!["a.jpg"]);

    let reopened = ImageCache::open(&images_dir, &manifest_path, 2).unwrap();
    assert!(reopened.contains(&a));
}

#[tokio::test]
async fn test_failed_download_leaves_manifest_untouched() {
    let temp = TempDir::new().unwrap();
    let downloader = StaticDownloader::new(b"bytes");
    let a = image("a.jpg", 2024, 1, 1);

    let mut cache = ImageCache::open_in(temp.path(), 5).unwrap();
    cache.download_and_cache(&a, &downloader, None).await.unwrap();
    let manifest_before = fs::read_to_string(cache.manifest_path()).unwrap();

    let err = cache
        .download_and_cache(&image("b.jpg", 2024, 1, 2), &FailingDownloader, None)
        .await
        .unwrap_err();

    assert!(err.is_remote());
    assert_eq!(cache.len(), 1);
    assert_eq!(
        fs::read_to_string(cache.manifest_path()).unwrap(),
        manifest_before
    );
}

#[tokio::test]
async fn test_pipeline_writes_final_file_and_removes_temp() {
    let temp = TempDir::new().unwrap();
    let downloader = StaticDownloader::new(&png_bytes(64, 48));
    let pipeline = MutationPipeline::new().with(Resize::new(16, 12));
    let a = image("a.png", 2024, 1, 1);

    let mut cache = ImageCache::open_in(temp.path(), 2).unwrap();
    assert!(cache
        .download_and_cache(&a, &downloader, Some(&pipeline))
        .await
        .unwrap());

    assert_eq!(files_in(temp.path()), vec!["a.png", MANIFEST_FILE_NAME]);
    let decoded = image::open(cache.image_path(&a)).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16, 12));
}

#[tokio::test]
async fn test_pipeline_failure_is_reported() {
    let temp = TempDir::new().unwrap();
    let downloader = StaticDownloader::new(b"not an image");
    let pipeline = MutationPipeline::new().with(Resize::new(16, 12));
    let a = image("a.jpg", 2024, 1, 1);

    let mut cache = ImageCache::open_in(temp.path(), 2).unwrap();
    let err = cache
        .download_and_cache(&a, &downloader, Some(&pipeline))
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::Image(_)));
    assert!(cache.is_empty());
    assert!(files_in(temp.path()).is_empty());
}

/// Records which thread applied it.
#[derive(Clone, Default)]
struct ThreadRecorder {
    thread: Arc<Mutex<Option<ThreadId>>>,
}

impl Mutation for ThreadRecorder {
    fn name(&self) -> &str {
        "thread-recorder"
    }

    fn apply(&self, image: DynamicImage, _metadata: &ImageMetadata) -> DynamicImage {
        *self.thread.lock().unwrap() = Some(thread::current().id());
        image
    }
}

#[tokio::test]
async fn test_pipeline_runs_off_the_async_thread() {
    let temp = TempDir::new().unwrap();
    let downloader = StaticDownloader::new(&png_bytes(8, 8));
    let recorder = ThreadRecorder::default();
    let pipeline = MutationPipeline::new().with(recorder.clone());

    let mut cache = ImageCache::open_in(temp.path(), 2).unwrap();
    cache
        .download_and_cache(&image("a.png", 2024, 1, 1), &downloader, Some(&pipeline))
        .await
        .unwrap();

    let worker = recorder.thread.lock().unwrap().expect("mutation applied");
    assert_ne!(worker, thread::current().id());
}

#[rstest]
#[case("../victim.txt")]
#[case("..")]
#[case("")]
#[case("nested/victim.txt")]
#[tokio::test]
async fn test_unsafe_id_is_rejected_before_any_write(#[case] id: &str) {
    let temp = TempDir::new().unwrap();
    let cache_dir = temp.path().join("cache");
    let victim = temp.path().join("victim.txt");
    fs::write(&victim, b"keep me").unwrap();

    let downloader = StaticDownloader::new(b"x");
    let mut cache = ImageCache::open_in(&cache_dir, 1).unwrap();
    let a = image("a.jpg", 2024, 1, 1);
    cache.download_and_cache(&a, &downloader, None).await.unwrap();

    let err = cache
        .download_and_cache(&image(id, 2024, 1, 2), &downloader, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::InvalidImageId(rejected) if rejected == id));
    assert_eq!(downloader.calls(), 1);
    assert!(cache.contains(&a));
    assert_eq!(fs::read(&victim).unwrap(), b"keep me");
}

#[tokio::test]
async fn test_absolute_id_is_rejected() {
    let temp = TempDir::new().unwrap();
    let victim = temp.path().join("victim.txt");
    fs::write(&victim, b"keep me").unwrap();

    let downloader = StaticDownloader::new(b"x");
    let mut cache = ImageCache::open_in(temp.path().join("cache"), 1).unwrap();
    let id = victim.to_string_lossy().into_owned();

    let err = cache
        .download_and_cache(&image(&id, 2024, 1, 1), &downloader, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::InvalidImageId(_)));
    assert_eq!(downloader.calls(), 0);
    assert_eq!(fs::read(&victim).unwrap(), b"keep me");
}

#[tokio::test]
async fn test_unsafe_manifest_record_is_dropped_and_never_evicted() {
    let temp = TempDir::new().unwrap();
    let cache_dir = temp.path().join("cache");
    let victim = temp.path().join("victim.txt");
    fs::write(&victim, b"keep me").unwrap();

    let downloader = StaticDownloader::new(b"x");
    let mut cache = ImageCache::open_in(&cache_dir, 1).unwrap();
    cache
        .download_and_cache(&image("a.jpg", 2024, 1, 1), &downloader, None)
        .await
        .unwrap();

    // Point the only record at a file outside the cache.
    let manifest_path = cache_dir.join(MANIFEST_FILE_NAME);
    let mut manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
    manifest["images"][0]["id"] = serde_json::json!("../victim.txt");
    fs::write(&manifest_path, manifest.to_string()).unwrap();

    let mut reopened = ImageCache::open_in(&cache_dir, 1).unwrap();
    assert!(reopened.is_empty());

    reopened
        .download_and_cache(&image("b.jpg", 2024, 1, 2), &downloader, None)
        .await
        .unwrap();

    assert_eq!(reopened.len(), 1);
    assert_eq!(fs::read(&victim).unwrap(), b"keep me");
}
