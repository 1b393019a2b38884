//! Composition root for request handlers.
//!
//! [`SocService`] ties a [`QueryConfig`], a [`RasterOpener`] and a
//! [`StatisticsCache`] together. The synchronous methods block on file I/O;
//! the `*_async` variants move that work onto tokio's blocking pool so an
//! async transport layer can call them from its handlers.
//!
//! # Example
//!
//! ```rust,no_run
//! use soc_query::{QueryConfig, SocService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), soc_query::QueryError> {
//!     let service = SocService::new(QueryConfig::from_env());
//!     let soc = service.value_at_async(-97.9, 41.95).await?;
//!     let stats = service.statistics_async().await?;
//!     println!("SOC {soc}, dataset mean {}", stats.mean);
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::QueryConfig;
use crate::error::{AccessFault, QueryError, Result};
use crate::geometry::projection::Crs;
use crate::geotiff::GeoTiffOpener;
use crate::point_query::{PointQuery, parse_crs};
use crate::raster::{RasterHandle, RasterOpener, Sample};
use crate::source::discover_rasters;
use crate::statistics::{SummaryStatistics, compute_statistics};
use crate::stats_cache::{StatisticsCache, StatisticsKey};

pub struct SocService<O: RasterOpener = GeoTiffOpener> {
    config: QueryConfig,
    opener: Arc<O>,
    cache: Arc<StatisticsCache>,
}

impl<O: RasterOpener> Clone for SocService<O> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            opener: Arc::clone(&self.opener),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl SocService<GeoTiffOpener> {
    /// Service reading GeoTIFFs with the configured chunk cache budget.
    #[must_use]
    pub fn new(config: QueryConfig) -> Self {
        let opener = GeoTiffOpener::new(config.chunk_cache_bytes);
        Self::with_opener(config, opener)
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::new(QueryConfig::from_env())
    }
}

impl<O: RasterOpener> SocService<O> {
    #[must_use]
    pub fn with_opener(config: QueryConfig, opener: O) -> Self {
        let cache = Arc::new(StatisticsCache::with_capacity(config.stats_cache_capacity));
        Self {
            config,
            opener: Arc::new(opener),
            cache,
        }
    }

    /// Share a statistics cache with other services.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<StatisticsCache>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<StatisticsCache> {
        &self.cache
    }

    #[must_use]
    pub fn opener(&self) -> &O {
        &self.opener
    }

    /// Value of `band` in one raster file at a coordinate in `crs`.
    pub fn point(&self, path: &Path, x: f64, y: f64, band: usize, crs: Crs) -> Result<f64> {
        let mut handle = self.opener.open(path)?;
        handle.sample_crs(crs, x, y, band)
    }

    /// Value of the default band at a lon/lat, searched across every raster
    /// of the dataset directory.
    ///
    /// The first file (in path order) whose grid contains the coordinate
    /// answers, with its value or `NoData`. When no file covers it the
    /// result is `OutOfBounds`.
    pub fn value_at(&self, lon: f64, lat: f64) -> Result<f64> {
        let dir = &self.config.dataset_dir;
        let files = discover_rasters(dir, &self.config.scan_options())?;
        if files.is_empty() {
            return Err(QueryError::NoFilesFound { directory: dir.clone() });
        }

        let (crs, band) = (self.config.default_crs, self.config.default_band);
        for path in &files {
            let mut handle = self.opener.open(path)?;
            let cell = match handle.locate(crs, lon, lat) {
                Ok(cell) => cell,
                Err(QueryError::OutOfBounds { .. }) => continue,
                Err(e) => return Err(e),
            };

            debug!(path = %path.display(), row = cell.row, col = cell.col, "Coordinate resolved");
            handle.metadata().check_band(band)?;
            return match handle.read_point(band, cell)? {
                Sample::Valid(value) => Ok(value),
                Sample::Masked => Err(QueryError::NoData {
                    x: lon,
                    y: lat,
                    row: cell.row,
                    col: cell.col,
                }),
            };
        }

        Err(QueryError::OutOfBounds { x: lon, y: lat })
    }

    /// Memoized statistics of the configured directory, band and window.
    pub fn statistics(&self) -> Result<Arc<SummaryStatistics>> {
        self.statistics_for(
            &self.config.dataset_dir,
            self.config.default_band,
            self.config.window_size,
        )
    }

    /// Memoized statistics for explicit parameters.
    pub fn statistics_for(&self, directory: &Path, band: usize, window_size: usize) -> Result<Arc<SummaryStatistics>> {
        let key = StatisticsKey::new(directory, band, window_size);
        self.cache
            .get_or_compute(&key, || self.compute(directory, band, window_size))
    }

    /// Recompute the configured statistics, replacing the memoized result.
    pub fn refresh_statistics(&self) -> Result<Arc<SummaryStatistics>> {
        let dir = &self.config.dataset_dir;
        let (band, window) = (self.config.default_band, self.config.window_size);
        let key = StatisticsKey::new(dir, band, window);
        self.cache.bypass(&key, || self.compute(dir, band, window))
    }

    fn compute(&self, directory: &Path, band: usize, window_size: usize) -> Result<SummaryStatistics> {
        compute_statistics(
            self.opener.as_ref(),
            &self.config.scan_options(),
            directory,
            band,
            window_size,
        )
    }
}

impl<O: RasterOpener + 'static> SocService<O> {
    pub async fn value_at_async(&self, lon: f64, lat: f64) -> Result<f64> {
        let service = self.clone();
        self.blocking(move || service.value_at(lon, lat)).await
    }

    /// [`SocService::point`] with optional band and CRS string from a
    /// request; missing ones fall back to the configured defaults.
    pub async fn point_async(
        &self,
        path: PathBuf,
        x: f64,
        y: f64,
        band: Option<usize>,
        crs: Option<String>,
    ) -> Result<f64> {
        let band = band.unwrap_or(self.config.default_band);
        let crs = match crs {
            Some(crs) => parse_crs(&crs)?,
            None => self.config.default_crs,
        };
        let service = self.clone();
        self.blocking(move || service.point(&path, x, y, band, crs)).await
    }

    pub async fn statistics_async(&self) -> Result<Arc<SummaryStatistics>> {
        let service = self.clone();
        self.blocking(move || service.statistics()).await
    }

    pub async fn refresh_statistics_async(&self) -> Result<Arc<SummaryStatistics>> {
        let service = self.clone();
        self.blocking(move || service.refresh_statistics()).await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f).await.map_err(|e| {
            QueryError::access(
                &self.config.dataset_dir,
                AccessFault::Task(format!("Task join error: {e}")),
            )
        })?
    }
}
