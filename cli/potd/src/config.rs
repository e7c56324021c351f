//! Configuration loading.
//!
//! Handles:
//! - Cache directory and capacity
//! - Market code sent to the archive service
//! - Caption font

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use potd_archive::ArchiveConfig;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the default cache directory.
const CACHE_DIR_ENV: &str = "POTD_CACHE_DIR";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "potd", "potd")
}

/// Get the default config file path.
fn default_config_path() -> Result<PathBuf> {
    project_dirs()
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding cached images and the manifest.
    #[serde(default = "default_cache_directory")]
    pub cache_directory: PathBuf,

    /// Maximum number of cached images.
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,

    /// Market code for the archive service.
    #[serde(default = "default_market")]
    pub market: String,

    /// Font file for `fetch --caption`; the bundled font when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_font: Option<PathBuf>,
}

fn default_cache_directory() -> PathBuf {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
        return PathBuf::from(dir);
    }

    project_dirs()
        .map(|dirs| dirs.cache_dir().join("images"))
        .unwrap_or_else(|| PathBuf::from("potd-cache"))
}

fn default_max_cache_size() -> usize {
    potd_archive::MAX_FETCHABLE
}

fn default_market() -> String {
    ArchiveConfig::default().market
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_directory: default_cache_directory(),
            max_cache_size: default_max_cache_size(),
            market: default_market(),
            caption_font: None,
        }
    }
}

impl Config {
    /// Load config from `path`, or from the default location.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file that was asked for explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Check values the cache and client depend on.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.max_cache_size < 1 {
            return Err(CliError::user(format!(
                "max_cache_size must be at least 1, got {}",
                self.max_cache_size
            )));
        }
        if self.market.trim().is_empty() {
            return Err(CliError::user("market must not be empty"));
        }
        Ok(())
    }

    /// Archive client settings derived from this config.
    pub fn archive_config(&self) -> ArchiveConfig {
        ArchiveConfig {
            market: self.market.clone(),
            ..Default::default()
        }
    }
}
