pub mod projection;
pub mod transform;

/// A 2D point in some coordinate reference system.
///
/// Geographic points carry longitude in `x` and latitude in `y`.
///
/// # Example
///
/// ```rust
/// use soc_query::Point;
///
/// let p = Point::lonlat(-97.9, 41.95);
/// assert_eq!(p.lon(), -97.9);
/// assert_eq!(p.lat(), 41.95);
///
/// let q: Point = (-97.9, 41.95).into();
/// assert_eq!(p, q);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// X coordinate (longitude for geographic points)
    pub x: f64,
    /// Y coordinate (latitude for geographic points)
    pub y: f64,
}

impl Point {
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Create a point from longitude and latitude.
    #[inline]
    #[must_use]
    pub fn lonlat(lon: f64, lat: f64) -> Self {
        Self { x: lon, y: lat }
    }

    #[inline]
    #[must_use]
    pub fn lon(&self) -> f64 {
        self.x
    }

    #[inline]
    #[must_use]
    pub fn lat(&self) -> f64 {
        self.y
    }
}

impl From<(f64, f64)> for Point {
    #[inline]
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

impl From<Point> for (f64, f64) {
    #[inline]
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// A (row, column) cell in a raster grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelCell {
    pub row: usize,
    pub col: usize,
}

impl PixelCell {
    #[inline]
    #[must_use]
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Resolve continuous grid coordinates to the enclosing cell.
    ///
    /// Uses the floor convention, so `(2.999, 0.0)` lands in column 2. Returns
    /// `None` when the cell falls outside a `width` x `height` grid, including
    /// for non-finite input.
    #[must_use]
    pub fn containing(col: f64, row: f64, width: usize, height: usize) -> Option<Self> {
        let col = col.floor();
        let row = row.floor();

        // NaN fails every comparison and is rejected here too.
        if !(col >= 0.0 && row >= 0.0 && col < width as f64 && row < height as f64) {
            return None;
        }

        Some(Self::new(row as usize, col as usize))
    }
}

/// A rectangular, end-exclusive window of a raster grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockWindow {
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub width: usize,
}

impl BlockWindow {
    #[must_use]
    pub fn new(row: usize, col: usize, height: usize, width: usize) -> Self {
        Self { row, col, height, width }
    }

    #[must_use]
    pub fn row_end(&self) -> usize {
        self.row + self.height
    }

    #[must_use]
    pub fn col_end(&self) -> usize {
        self.col + self.width
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.height * self.width
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    /// Whether the window lies entirely inside a `width` x `height` grid.
    #[must_use]
    pub fn fits(&self, width: usize, height: usize) -> bool {
        self.row_end() <= height && self.col_end() <= width
    }

    #[must_use]
    pub fn contains(&self, cell: PixelCell) -> bool {
        (self.row..self.row_end()).contains(&cell.row) && (self.col..self.col_end()).contains(&cell.col)
    }
}
