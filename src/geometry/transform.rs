//! Affine grid transform between raster cells and native CRS coordinates.
//!
//! Maps continuous grid coordinates (col, row) to world coordinates (x, y):
//!
//! ```text
//! x = a * col + b * row + c
//! y = d * col + e * row + f
//! ```
//!
//! Cell `(row, col)` covers the square from grid coordinate `(col, row)` to
//! `(col + 1, row + 1)`, so flooring the inverse-transformed coordinate gives
//! the enclosing cell.

use crate::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    #[must_use]
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform anchored at the top-left corner of the grid.
    #[must_use]
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new(pixel_width, 0.0, origin_x, 0.0, -pixel_height, origin_y)
    }

    /// Build from GeoTIFF `ModelTiepointTag` (i, j, k, x, y, z) and
    /// `ModelPixelScaleTag` (sx, sy, sz).
    #[must_use]
    pub fn from_tiepoint(tiepoint: &[f64; 6], pixel_scale: &[f64; 3]) -> Self {
        let [i, j, _, x, y, _] = *tiepoint;
        let [sx, sy, _] = *pixel_scale;
        Self::new(sx, 0.0, x - i * sx, 0.0, -sy, y + j * sy)
    }

    /// Build from a row-major 4x4 GeoTIFF `ModelTransformationTag`.
    #[must_use]
    pub fn from_model_transformation(m: &[f64; 16]) -> Self {
        Self::new(m[0], m[1], m[3], m[4], m[5], m[7])
    }

    /// Shift the anchor by half a cell, converting a `PixelIsPoint` transform
    /// (world coordinate names the cell center) to `PixelIsArea`.
    #[must_use]
    pub fn pixel_is_point_to_area(&self) -> Self {
        let (c, f) = self.forward(-0.5, -0.5);
        Self { c, f, ..*self }
    }

    /// Grid coordinates (col, row) to world coordinates.
    #[must_use]
    pub fn forward(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// World coordinates to continuous grid coordinates (col, row).
    ///
    /// Returns `None` for a singular transform.
    #[must_use]
    pub fn world_to_grid(&self, world: Point) -> Option<(f64, f64)> {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < f64::EPSILON * f64::EPSILON || !det.is_finite() {
            return None;
        }

        let dx = world.x - self.c;
        let dy = world.y - self.f;
        let col = (self.e * dx - self.b * dy) / det;
        let row = (self.a * dy - self.d * dx) / det;

        Some((col, row))
    }

    /// World extent `(min_x, min_y, max_x, max_y)` of a `width` x `height` grid.
    #[must_use]
    pub fn extent(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (w, h) = (width as f64, height as f64);
        let corners = [
            self.forward(0.0, 0.0),
            self.forward(w, 0.0),
            self.forward(0.0, h),
            self.forward(w, h),
        ];

        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}
