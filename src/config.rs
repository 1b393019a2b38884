//! Query configuration.
//!
//! Defaults can be overridden from the environment:
//! - `SOC_DATASET_DIR` - directory holding the raster dataset (default: `data`)
//! - `SOC_BAND` - default band, 1-based (default: 1)
//! - `SOC_WINDOW_SIZE` - block edge length for statistics (default: 1024)
//! - `SOC_CHUNK_CACHE_MB` - per-handle decoded chunk cache (default: 64)
//! - `SOC_STATS_CACHE_CAPACITY` - memoized statistics results (default: 16)
//!
//! Unparsable values fall back to the default with a warning.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::geometry::projection::Crs;
use crate::source::ScanOptions;

pub const DEFAULT_WINDOW_SIZE: usize = 1024;
pub const DEFAULT_CHUNK_CACHE_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_STATS_CACHE_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Directory scanned for statistics and coordinate lookups
    pub dataset_dir: PathBuf,
    /// Band used when the caller does not name one (1-based)
    pub default_band: usize,
    /// CRS of caller coordinates when none is given
    pub default_crs: Crs,
    /// Maximum block edge length for streaming statistics
    pub window_size: usize,
    /// Byte budget of each handle's decoded chunk cache
    pub chunk_cache_bytes: usize,
    /// Number of memoized statistics results kept
    pub stats_cache_capacity: usize,
    /// Raster file extensions (case-insensitive)
    pub extensions: Vec<String>,
    /// Whether directory discovery follows symbolic links
    pub follow_links: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("data"),
            default_band: 1,
            default_crs: Crs::WGS84,
            window_size: DEFAULT_WINDOW_SIZE,
            chunk_cache_bytes: DEFAULT_CHUNK_CACHE_BYTES,
            stats_cache_capacity: DEFAULT_STATS_CACHE_CAPACITY,
            extensions: vec!["tif".to_string(), "tiff".to_string()],
            follow_links: false,
        }
    }
}

impl QueryConfig {
    /// Defaults overridden by `SOC_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`QueryConfig::from_env`] but reading variables through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let dataset_dir = lookup("SOC_DATASET_DIR")
            .filter(|v| !v.trim().is_empty())
            .map_or(defaults.dataset_dir, PathBuf::from);

        let default_band = parse_var(&lookup, "SOC_BAND", defaults.default_band, |&b| b >= 1);
        let window_size = parse_var(&lookup, "SOC_WINDOW_SIZE", defaults.window_size, |&w| w >= 1);
        let chunk_cache_bytes = parse_var(
            &lookup,
            "SOC_CHUNK_CACHE_MB",
            defaults.chunk_cache_bytes / (1024 * 1024),
            |_| true,
        )
        .saturating_mul(1024 * 1024);
        let stats_cache_capacity = parse_var(
            &lookup,
            "SOC_STATS_CACHE_CAPACITY",
            defaults.stats_cache_capacity,
            |&c| c >= 1,
        );

        Self {
            dataset_dir,
            default_band,
            window_size,
            chunk_cache_bytes,
            stats_cache_capacity,
            ..defaults
        }
    }

    #[must_use]
    pub fn with_dataset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dataset_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_default_band(mut self, band: usize) -> Self {
        self.default_band = band;
        self
    }

    #[must_use]
    pub fn with_default_crs(mut self, crs: Crs) -> Self {
        self.default_crs = crs;
        self
    }

    #[must_use]
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    #[must_use]
    pub fn with_chunk_cache_bytes(mut self, bytes: usize) -> Self {
        self.chunk_cache_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_stats_cache_capacity(mut self, capacity: usize) -> Self {
        self.stats_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Directory scan options derived from this config.
    #[must_use]
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            extensions: self.extensions.clone(),
            follow_links: self.follow_links,
            ..ScanOptions::default()
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return default;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(variable = name, value = %raw, default = %default, "Ignoring invalid setting");
            default
        }
    }
}
