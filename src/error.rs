//! Error taxonomy for raster queries.
//!
//! Every core operation returns [`QueryError`]. The variants are deliberately
//! distinguishable so a transport layer can map them without inspecting
//! messages: [`QueryError::is_client_error`] separates caller-facing
//! conditions (wrong location, masked cell, bad argument) from faults of the
//! dataset or the host.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Error, Debug)]
pub enum QueryError {
    /// The raster could not be opened, is not a valid geo-referenced raster,
    /// or failed mid-read.
    #[error("Cannot access raster {}: {fault}", path.display())]
    Access {
        path: PathBuf,
        #[source]
        fault: AccessFault,
    },

    /// The coordinate resolves to a cell outside the raster grid.
    #[error("Coordinates ({x}, {y}) are outside the data coverage area")]
    OutOfBounds { x: f64, y: f64 },

    /// The coordinate is inside the grid but the cell holds no measurement.
    #[error("No data at ({x}, {y}): cell (row {row}, col {col}) is masked")]
    NoData { x: f64, y: f64, row: usize, col: usize },

    #[error("No raster files found in {}", directory.display())]
    NoFilesFound { directory: PathBuf },

    #[error("Every sample in {} is masked", directory.display())]
    NoValidData { directory: PathBuf },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl QueryError {
    pub fn access(path: impl AsRef<Path>, fault: impl Into<AccessFault>) -> Self {
        Self::Access {
            path: path.as_ref().to_path_buf(),
            fault: fault.into(),
        }
    }

    /// `true` for outcomes caused by the request itself (HTTP 4xx territory),
    /// `false` for dataset or system faults.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. } | Self::NoData { .. } | Self::InvalidArgument(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum AccessFault {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF decoding error: {0}")]
    Decode(#[from] tiff::TiffError),

    #[error("Unsupported raster layout: {0}")]
    Unsupported(String),

    #[error("Not a geo-referenced raster: {0}")]
    NotGeoreferenced(String),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Worker task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("Cannot parse CRS identifier {0:?}")]
    InvalidCrs(String),

    #[error("EPSG:{0} is not in the crs-definitions database")]
    UnknownCrs(i32),

    /// The definition exists but `proj4rs` cannot build a projection from it.
    #[error("EPSG:{0} has an unusable definition: {1}")]
    InvalidDefinition(i32, String),

    #[error("Transform failed: {0}")]
    TransformFailed(String),
}
