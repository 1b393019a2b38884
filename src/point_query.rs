//! Point queries: the value of one band at one coordinate.
//!
//! The coordinate is reprojected into the raster's native CRS, mapped to the
//! enclosing cell with the raster's affine transform and read from the file.
//!
//! # Example
//!
//! ```rust,no_run
//! use soc_query::{DEFAULT_BAND, DEFAULT_CRS, GeoTiffOpener, query_point};
//! use std::path::Path;
//!
//! let opener = GeoTiffOpener::default();
//! let soc = query_point(&opener, -97.9, 41.95, Path::new("data/soc.tif"), DEFAULT_BAND, DEFAULT_CRS)?;
//! println!("SOC: {soc}");
//! # Ok::<(), soc_query::QueryError>(())
//! ```

use std::path::Path;

use tracing::instrument;

use crate::error::{AccessFault, ProjectionError, QueryError, Result};
use crate::geometry::projection::{Crs, reproject};
use crate::geometry::{PixelCell, Point};
use crate::raster::{RasterHandle, RasterOpener, Sample};

pub const DEFAULT_BAND: usize = 1;
pub const DEFAULT_CRS: &str = "EPSG:4326";

/// Point sampling on an open raster.
pub trait PointQuery {
    /// Resolve a coordinate in `crs` to the enclosing cell of this raster.
    fn locate(&self, crs: Crs, x: f64, y: f64) -> Result<PixelCell>;

    /// Sample one band at coordinates in a specific CRS.
    fn sample_crs(&mut self, crs: Crs, x: f64, y: f64, band: usize) -> Result<f64>;

    /// Sample one band at a WGS84 lon/lat coordinate.
    fn sample_lonlat(&mut self, lon: f64, lat: f64, band: usize) -> Result<f64> {
        self.sample_crs(Crs::WGS84, lon, lat, band)
    }
}

impl<H: RasterHandle + ?Sized> PointQuery for H {
    fn locate(&self, crs: Crs, x: f64, y: f64) -> Result<PixelCell> {
        check_coordinate(crs, x, y)?;

        let meta = self.metadata();
        let native = reproject(Point::new(x, y), crs, meta.effective_crs())
            .map_err(|e| projection_failure(self.path(), x, y, e))?;

        let (col, row) = meta.transform.world_to_grid(native).ok_or_else(|| {
            QueryError::access(
                self.path(),
                AccessFault::NotGeoreferenced("singular affine transform".into()),
            )
        })?;

        PixelCell::containing(col, row, meta.width, meta.height).ok_or(QueryError::OutOfBounds { x, y })
    }

    fn sample_crs(&mut self, crs: Crs, x: f64, y: f64, band: usize) -> Result<f64> {
        self.metadata().check_band(band)?;
        let cell = self.locate(crs, x, y)?;

        match self.read_point(band, cell)? {
            Sample::Valid(value) => Ok(value),
            Sample::Masked => Err(QueryError::NoData {
                x,
                y,
                row: cell.row,
                col: cell.col,
            }),
        }
    }
}

/// Value of `band` at `(lon, lat)` given in `source_crs`.
///
/// Opens the raster, samples one cell and drops the handle before returning.
#[instrument(skip(opener, path), fields(path = %path.display()))]
pub fn query_point<O>(opener: &O, lon: f64, lat: f64, path: &Path, band: usize, source_crs: &str) -> Result<f64>
where
    O: RasterOpener + ?Sized,
{
    let crs = parse_crs(source_crs)?;
    let mut handle = opener.open(path)?;
    handle.sample_crs(crs, lon, lat, band)
}

/// Sample many coordinates from one raster, opened once.
///
/// Open failures fail the whole call; per-point outcomes are independent.
pub fn query_points<O>(
    opener: &O,
    path: &Path,
    points: &[(f64, f64)],
    band: usize,
    source_crs: &str,
) -> Result<Vec<Result<f64>>>
where
    O: RasterOpener + ?Sized,
{
    let crs = parse_crs(source_crs)?;
    let mut handle = opener.open(path)?;
    Ok(points
        .iter()
        .map(|&(x, y)| handle.sample_crs(crs, x, y, band))
        .collect())
}

/// Parse a caller-supplied CRS identifier.
pub fn parse_crs(s: &str) -> Result<Crs> {
    s.parse::<Crs>()
        .map_err(|e| QueryError::InvalidArgument(e.to_string()))
}

/// A point with no position in the raster's CRS cannot lie on its grid.
/// Every other projection failure is a fault of the raster's CRS.
fn projection_failure(path: &Path, x: f64, y: f64, error: ProjectionError) -> QueryError {
    match error {
        ProjectionError::TransformFailed(_) => QueryError::OutOfBounds { x, y },
        e => QueryError::access(path, e),
    }
}

fn check_coordinate(crs: Crs, x: f64, y: f64) -> Result<()> {
    if !x.is_finite() || !y.is_finite() {
        return Err(QueryError::InvalidArgument(format!("non-finite coordinate ({x}, {y})")));
    }
    if crs.is_geographic() && !((-180.0..=180.0).contains(&x) && (-90.0..=90.0).contains(&y)) {
        return Err(QueryError::InvalidArgument(format!(
            "longitude {x} / latitude {y} outside [-180, 180] / [-90, 90]"
        )));
    }
    Ok(())
}
