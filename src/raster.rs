//! Raster access primitives shared by point queries and statistics.
//!
//! A [`RasterOpener`] turns a path into an exclusively owned [`RasterHandle`].
//! Handles expose grid metadata plus masked-aware point and window reads;
//! dropping a handle releases everything it holds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array2, Array3, Zip, s};

use crate::error::{QueryError, Result};
use crate::geometry::projection::Crs;
use crate::geometry::transform::GeoTransform;
use crate::geometry::{BlockWindow, PixelCell, Point};

/// Grid-level description of an open raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    /// Number of data bands (mask channels excluded).
    pub bands: usize,
    /// Native CRS, `None` when the file does not declare one.
    pub crs: Option<Crs>,
    /// Declared nodata sentinel, already cast to the sample precision.
    pub nodata: Option<f64>,
    pub transform: GeoTransform,
}

impl RasterMetadata {
    /// CRS used for reprojection; rasters without one are taken as WGS84.
    #[must_use]
    pub fn effective_crs(&self) -> Crs {
        self.crs.unwrap_or(Crs::WGS84)
    }

    /// Native-CRS extent `(min_x, min_y, max_x, max_y)`.
    #[must_use]
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        self.transform.extent(self.width, self.height)
    }

    /// Cell enclosing a point given in the native CRS.
    #[must_use]
    pub fn cell_at(&self, point: Point) -> Option<PixelCell> {
        let (col, row) = self.transform.world_to_grid(point)?;
        PixelCell::containing(col, row, self.width, self.height)
    }

    /// Whether a raw sample is a nodata marker (declared sentinel or NaN).
    #[inline]
    #[must_use]
    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nodata| value == nodata)
    }

    /// Reject band indices outside `1..=bands`.
    pub fn check_band(&self, band: usize) -> Result<()> {
        if band == 0 || band > self.bands {
            return Err(QueryError::InvalidArgument(format!(
                "band {band} out of range (raster has {} band{})",
                self.bands,
                if self.bands == 1 { "" } else { "s" }
            )));
        }
        Ok(())
    }

    /// Reject windows that extend past the grid.
    pub fn check_window(&self, window: BlockWindow) -> Result<()> {
        if !window.fits(self.width, self.height) {
            return Err(QueryError::InvalidArgument(format!(
                "window {window:?} exceeds {}x{} grid",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// One reading from one band at one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Valid(f64),
    Masked,
}

impl Sample {
    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            Sample::Valid(v) => Some(v),
            Sample::Masked => None,
        }
    }

    #[must_use]
    pub fn is_masked(self) -> bool {
        matches!(self, Sample::Masked)
    }
}

/// Values of one band over a window, with a parallel mask (`true` = masked).
#[derive(Debug, Clone)]
pub struct Block {
    pub window: BlockWindow,
    pub values: Array2<f64>,
    pub mask: Array2<bool>,
}

impl Block {
    #[must_use]
    pub fn new(window: BlockWindow, values: Array2<f64>, mask: Array2<bool>) -> Self {
        debug_assert_eq!(values.dim(), (window.height, window.width));
        debug_assert_eq!(mask.dim(), values.dim());
        Self { window, values, mask }
    }

    #[must_use]
    pub fn is_fully_masked(&self) -> bool {
        self.mask.iter().all(|&masked| masked)
    }

    /// Unmasked samples in row-major order.
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .zip(self.mask.iter())
            .filter(|&(_, &masked)| !masked)
            .map(|(&v, _)| v)
    }

    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&masked| !masked).count()
    }

    /// Sample at a grid cell, `None` if the cell is outside this block.
    #[must_use]
    pub fn sample(&self, cell: PixelCell) -> Option<Sample> {
        if !self.window.contains(cell) {
            return None;
        }
        let idx = [cell.row - self.window.row, cell.col - self.window.col];
        Some(if self.mask[idx] {
            Sample::Masked
        } else {
            Sample::Valid(self.values[idx])
        })
    }
}

/// An open raster. Bands are 1-based.
pub trait RasterHandle {
    fn metadata(&self) -> &RasterMetadata;

    fn path(&self) -> &Path;

    /// Read one band over a window of the grid.
    fn read_window(&mut self, band: usize, window: BlockWindow) -> Result<Block>;

    /// Read exactly one cell.
    fn read_point(&mut self, band: usize, cell: PixelCell) -> Result<Sample> {
        let block = self.read_window(band, BlockWindow::new(cell.row, cell.col, 1, 1))?;
        Ok(if block.mask[[0, 0]] {
            Sample::Masked
        } else {
            Sample::Valid(block.values[[0, 0]])
        })
    }

    /// Start a fresh row-major traversal of `window_size` square blocks.
    fn blocks(&mut self, band: usize, window_size: usize) -> Result<Blocks<'_, Self>> {
        self.metadata().check_band(band)?;
        if window_size == 0 {
            return Err(QueryError::InvalidArgument("window size must be at least 1".into()));
        }
        let windows = BlockWindows::new(self.metadata().width, self.metadata().height, window_size);
        Ok(Blocks {
            handle: self,
            band,
            windows,
            failed: false,
        })
    }
}

/// Opens rasters by path.
pub trait RasterOpener: Send + Sync {
    type Handle: RasterHandle;

    fn open(&self, path: &Path) -> Result<Self::Handle>;
}

impl<O: RasterOpener + ?Sized> RasterOpener for Arc<O> {
    type Handle = O::Handle;

    fn open(&self, path: &Path) -> Result<Self::Handle> {
        (**self).open(path)
    }
}

/// Row-major tiling of a grid into windows of at most `size` x `size`.
///
/// The windows partition the grid: no overlap, and their union covers it.
#[derive(Debug, Clone)]
pub struct BlockWindows {
    width: usize,
    height: usize,
    size: usize,
    row: usize,
    col: usize,
}

impl BlockWindows {
    #[must_use]
    pub fn new(width: usize, height: usize, size: usize) -> Self {
        Self {
            width,
            height,
            size: size.max(1),
            row: 0,
            col: 0,
        }
    }
}

impl Iterator for BlockWindows {
    type Item = BlockWindow;

    fn next(&mut self) -> Option<BlockWindow> {
        if self.width == 0 || self.row >= self.height {
            return None;
        }

        let window = BlockWindow::new(
            self.row,
            self.col,
            self.size.min(self.height - self.row),
            self.size.min(self.width - self.col),
        );

        self.col += self.size;
        if self.col >= self.width {
            self.col = 0;
            self.row += self.size;
        }

        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.width == 0 || self.row >= self.height {
            return (0, Some(0));
        }
        let across = self.width.div_ceil(self.size);
        let rows_left = (self.height - self.row).div_ceil(self.size);
        let n = rows_left * across - self.col / self.size;
        (n, Some(n))
    }
}

/// Lazy block reads over one handle.
///
/// Each item is read on demand. After the first error the iterator is
/// exhausted.
pub struct Blocks<'a, H: RasterHandle + ?Sized> {
    handle: &'a mut H,
    band: usize,
    windows: BlockWindows,
    failed: bool,
}

impl<H: RasterHandle + ?Sized> Iterator for Blocks<'_, H> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let window = self.windows.next()?;
        let block = self.handle.read_window(self.band, window);
        self.failed = block.is_err();
        Some(block)
    }
}

/// In-memory raster of shape `(bands, rows, cols)`.
///
/// Nodata is detected from NaN, the optional sentinel and an optional
/// explicit mask of the same shape.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    path: PathBuf,
    data: Arc<Array3<f64>>,
    mask: Option<Arc<Array3<bool>>>,
    metadata: RasterMetadata,
}

impl MemoryRaster {
    #[must_use]
    pub fn new(data: Array3<f64>, transform: GeoTransform) -> Self {
        let (bands, height, width) = data.dim();
        Self {
            path: PathBuf::from("memory"),
            data: Arc::new(data),
            mask: None,
            metadata: RasterMetadata {
                width,
                height,
                bands,
                crs: None,
                nodata: None,
                transform,
            },
        }
    }

    /// Single-band raster from a `(rows, cols)` array.
    #[must_use]
    pub fn single_band(data: Array2<f64>, transform: GeoTransform) -> Self {
        Self::new(data.insert_axis(ndarray::Axis(0)), transform)
    }

    #[must_use]
    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.metadata.crs = Some(crs);
        self
    }

    #[must_use]
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.metadata.nodata = Some(nodata);
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Attach an explicit mask (`true` = masked).
    pub fn with_mask(mut self, mask: Array3<bool>) -> Result<Self> {
        if mask.dim() != self.data.dim() {
            return Err(QueryError::InvalidArgument(format!(
                "mask shape {:?} does not match data shape {:?}",
                mask.dim(),
                self.data.dim()
            )));
        }
        self.mask = Some(Arc::new(mask));
        Ok(self)
    }
}

impl RasterHandle for MemoryRaster {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read_window(&mut self, band: usize, window: BlockWindow) -> Result<Block> {
        self.metadata.check_band(band)?;
        self.metadata.check_window(window)?;

        let b = band - 1;
        let rows = window.row..window.row_end();
        let cols = window.col..window.col_end();
        let values = self.data.slice(s![b, rows.clone(), cols.clone()]).to_owned();

        let mut mask = values.mapv(|v| self.metadata.is_nodata(v));
        if let Some(explicit) = &self.mask {
            Zip::from(&mut mask)
                .and(explicit.slice(s![b, rows, cols]))
                .for_each(|m, &e| *m |= e);
        }

        Ok(Block::new(window, values, mask))
    }
}

/// Serves [`MemoryRaster`]s registered under paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryOpener {
    rasters: HashMap<PathBuf, MemoryRaster>,
}

impl MemoryOpener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, raster: MemoryRaster) {
        let path = path.into();
        self.rasters.insert(path.clone(), raster.with_path(path));
    }

    #[must_use]
    pub fn with(mut self, path: impl Into<PathBuf>, raster: MemoryRaster) -> Self {
        self.insert(path, raster);
        self
    }
}

impl RasterOpener for MemoryOpener {
    type Handle = MemoryRaster;

    fn open(&self, path: &Path) -> Result<MemoryRaster> {
        self.rasters.get(path).cloned().ok_or_else(|| {
            QueryError::access(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such raster"),
            )
        })
    }
}
