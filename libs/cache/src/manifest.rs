//! Persisted manifest of cached images.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use potd_archive::ImageMetadata;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CacheError;

/// Manifest schema version written by this crate.
pub(crate) const MANIFEST_VERSION: u32 = 1;

const MANIFEST_COMMENT: &str = "This file was created by potd and lists the images cached in this directory. Do not edit it unless you know what you're doing!";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    #[serde(rename = "$comment", default)]
    comment: String,

    #[serde(default = "default_version")]
    version: u32,

    #[serde(default)]
    images: Vec<ImageMetadata>,
}

fn default_version() -> u32 {
    MANIFEST_VERSION
}

/// Read the records listed in the manifest at `path`.
///
/// Returns `None` when the file is missing, unreadable, corrupt, or written by
/// a newer schema.
pub(crate) fn load(path: &Path) -> Option<Vec<ImageMetadata>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "No readable manifest");
            return None;
        }
    };

    let manifest: Manifest = match serde_json::from_str(&contents) {
        Ok(manifest) => manifest,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Ignoring corrupt manifest");
            return None;
        }
    };

    if manifest.version > MANIFEST_VERSION {
        debug!(
            path = %path.display(),
            version = manifest.version,
            "Ignoring manifest from a newer schema"
        );
        return None;
    }

    Some(manifest.images)
}

/// Rewrite the manifest at `path` with `images`.
///
/// The new content is written to a sibling temp file and renamed over the old
/// one, so a crash leaves either the previous or the new manifest.
pub(crate) fn save(path: &Path, images: &[ImageMetadata]) -> Result<(), CacheError> {
    let manifest = Manifest {
        comment: MANIFEST_COMMENT.to_string(),
        version: MANIFEST_VERSION,
        images: images.to_vec(),
    };
    let contents = serde_json::to_string_pretty(&manifest)?;

    let temp_path = temp_sibling(path);
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    debug!(path = %path.display(), count = images.len(), "Manifest persisted");
    Ok(())
}

/// `<path>.tmp`, keeping the original extension.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
