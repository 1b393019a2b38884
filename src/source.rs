//! Raster file discovery on the local filesystem.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{AccessFault, QueryError, Result};

/// Options for scanning a dataset directory.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Minimum directory depth to scan (0 = include root files)
    pub min_depth: usize,
    /// Maximum directory depth to scan (None = unlimited)
    pub max_depth: Option<usize>,
    /// File extensions to consider as rasters (case-insensitive)
    pub extensions: Vec<String>,
    /// Whether to follow symbolic links
    pub follow_links: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            min_depth: 0,
            max_depth: None,
            extensions: vec!["tif".to_string(), "tiff".to_string()],
            follow_links: false,
        }
    }
}

impl ScanOptions {
    #[must_use]
    pub fn with_min_depth(mut self, depth: usize) -> Self {
        self.min_depth = depth;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Whether `path` carries one of the configured extensions.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }
}

/// Recursively list raster files under `root`, sorted by path.
///
/// A missing or non-directory root yields [`QueryError::NoFilesFound`]. An
/// unreadable entry fails the whole scan rather than returning a partial
/// listing.
pub fn discover_rasters(root: &Path, options: &ScanOptions) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(QueryError::NoFilesFound {
            directory: root.to_path_buf(),
        });
    }

    let mut walker = WalkDir::new(root)
        .min_depth(options.min_depth)
        .follow_links(options.follow_links)
        .sort_by_file_name();

    if let Some(max) = options.max_depth {
        walker = walker.max_depth(max);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let io = e.into_io_error().unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            QueryError::access(path, AccessFault::Io(io))
        })?;

        if entry.file_type().is_file() && options.matches(entry.path()) {
            debug!(path = %entry.path().display(), "Discovered raster");
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
