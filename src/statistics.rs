//! Streaming summary statistics over a directory of rasters.
//!
//! Every file is read block by block; each block's valid samples are folded
//! into a [`RunningAggregate`], so peak memory is bounded by one block plus
//! the handle's chunk cache regardless of raster size. The result does not
//! depend on file order or block size beyond floating point rounding of the
//! sum, which is compensated.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{QueryError, Result};
use crate::raster::{Block, RasterHandle, RasterOpener};
use crate::source::{ScanOptions, discover_rasters};

/// Running min/max/sum/count over valid samples.
///
/// The sum is Neumaier-compensated. Merging two aggregates is associative
/// and commutative up to that compensation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningAggregate {
    min: f64,
    max: f64,
    sum: f64,
    compensation: f64,
    count: u64,
}

impl Default for RunningAggregate {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningAggregate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            compensation: 0.0,
            count: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.add(value);
        self.count += 1;
    }

    /// Fold the valid samples of a block. Returns `false` when the block is
    /// fully masked and was skipped.
    pub fn fold_block(&mut self, block: &Block) -> bool {
        if block.is_fully_masked() {
            return false;
        }

        let mut partial = Self::new();
        block.valid_values().for_each(|v| partial.push(v));
        self.merge(&partial);
        true
    }

    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.add(other.sum);
        self.compensation += other.compensation;
        self.count += other.count;
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Current `(min, max)`, `None` before any sample.
    #[must_use]
    pub fn bounds(&self) -> Option<(f64, f64)> {
        (self.count > 0).then_some((self.min, self.max))
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum + self.compensation
    }

    /// Final statistics, `None` if no valid sample was seen.
    #[must_use]
    pub fn finish(&self, files: usize) -> Option<SummaryStatistics> {
        if self.count == 0 {
            return None;
        }
        let mean = (self.sum() / self.count as f64).clamp(self.min, self.max);
        Some(SummaryStatistics {
            min: self.min,
            max: self.max,
            mean,
            count: self.count,
            files,
        })
    }

    #[inline]
    fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }
}

/// Min, max and mean of every valid sample in a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Number of valid samples folded
    pub count: u64,
    /// Number of raster files read
    pub files: usize,
}

/// Aggregate one band over every raster under `directory`.
///
/// Files are processed one at a time and each handle is dropped before the
/// next file is opened. Any failure aborts the whole computation; no partial
/// result is returned.
#[instrument(skip(opener, options, directory), fields(directory = %directory.display()))]
pub fn compute_statistics<O>(
    opener: &O,
    options: &ScanOptions,
    directory: &Path,
    band: usize,
    window_size: usize,
) -> Result<SummaryStatistics>
where
    O: RasterOpener + ?Sized,
{
    if band == 0 {
        return Err(QueryError::InvalidArgument("band numbers start at 1".into()));
    }
    if window_size == 0 {
        return Err(QueryError::InvalidArgument("window size must be at least 1".into()));
    }

    let files = discover_rasters(directory, options)?;
    if files.is_empty() {
        return Err(QueryError::NoFilesFound {
            directory: directory.to_path_buf(),
        });
    }

    let mut total = RunningAggregate::new();
    for path in &files {
        total.merge(&aggregate_file(opener, path, band, window_size)?);
    }

    let stats = total.finish(files.len()).ok_or_else(|| QueryError::NoValidData {
        directory: directory.to_path_buf(),
    })?;

    info!(
        files = stats.files,
        count = stats.count,
        min = stats.min,
        max = stats.max,
        mean = stats.mean,
        "Computed statistics"
    );
    Ok(stats)
}

/// Aggregate one band of a single raster block by block.
pub fn aggregate_file<O>(opener: &O, path: &Path, band: usize, window_size: usize) -> Result<RunningAggregate>
where
    O: RasterOpener + ?Sized,
{
    let mut handle = opener.open(path)?;
    let mut aggregate = RunningAggregate::new();
    let mut blocks = 0usize;
    let mut skipped = 0usize;

    for block in handle.blocks(band, window_size)? {
        blocks += 1;
        if !aggregate.fold_block(&block?) {
            skipped += 1;
        }
    }

    debug!(
        path = %path.display(),
        band,
        window = window_size,
        blocks,
        skipped,
        count = aggregate.count(),
        "Aggregated raster"
    );
    Ok(aggregate)
}
