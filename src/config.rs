//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;

use crate::cache::{
    CompactionPolicy, DEFAULT_CACHE_FILE_NAME, DEFAULT_STORAGE_LIMIT_BYTES, BYTES_PER_MB,
};

/// Default directory holding the cache file
pub const DEFAULT_CACHE_DIR: &str = ".anydata-cache";

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory that holds the cache file
    pub cache_dir: PathBuf,
    /// Name of the cache file inside `cache_dir`
    pub file_name: String,
    /// Byte budget for auto-delete records
    pub storage_limit_bytes: u64,
    /// When to reclaim disk space on connect
    pub compaction: CompactionPolicy,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `ANYDATA_CACHE_DIR` - Cache directory (default: `.anydata-cache`)
    /// - `ANYDATA_CACHE_FILE` - Cache file name (default: `DataCache.sqlite`)
    /// - `ANYDATA_CACHE_LIMIT_MB` - Storage budget in MiB (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: env::var("ANYDATA_CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            file_name: env::var("ANYDATA_CACHE_FILE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.file_name),
            storage_limit_bytes: env::var("ANYDATA_CACHE_LIMIT_MB")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|mb| *mb > 0)
                .and_then(|mb| mb.checked_mul(BYTES_PER_MB))
                .unwrap_or(defaults.storage_limit_bytes),
            compaction: defaults.compaction,
        }
    }

    /// Creates a Config rooted at `cache_dir` with all other values defaulted.
    pub fn in_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Full path of the cache file.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(&self.file_name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            file_name: DEFAULT_CACHE_FILE_NAME.to_string(),
            storage_limit_bytes: DEFAULT_STORAGE_LIMIT_BYTES,
            compaction: CompactionPolicy::default(),
        }
    }
}
