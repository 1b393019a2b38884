//! # soc-query - Point queries and streaming statistics over soil-carbon GeoTIFFs
//!
//! Answers two questions about a directory of geo-referenced rasters:
//!
//! - **What is the value here?** [`query_point`] reprojects a coordinate into
//!   the raster's CRS, resolves the enclosing cell and reads one sample.
//! - **What are the dataset's min, max and mean?** [`compute_statistics`]
//!   streams every file block by block, so rasters larger than memory are
//!   fine, and [`StatisticsCache`] memoizes the answer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use soc_query::{GeoTiffOpener, ScanOptions, compute_statistics, query_point};
//! use std::path::Path;
//!
//! let opener = GeoTiffOpener::default();
//!
//! let soc = query_point(&opener, -97.9, 41.95, Path::new("data/soc.tif"), 1, "EPSG:4326")?;
//! println!("SOC at point: {soc}");
//!
//! let stats = compute_statistics(&opener, &ScanOptions::default(), Path::new("data"), 1, 1024)?;
//! println!("min {} max {} mean {}", stats.min, stats.max, stats.mean);
//! # Ok::<(), soc_query::QueryError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`raster`]: the [`RasterHandle`] / [`RasterOpener`] access contract and an in-memory raster
//! - [`geotiff`]: GeoTIFF handles over the `tiff` decoder
//! - [`chunk_cache`]: per-handle LRU of decoded chunks
//! - [`geometry`]: [`Point`], grid cells and windows, affine transforms and CRS reprojection
//! - [`point_query`]: coordinate sampling via the [`PointQuery`] trait
//! - [`statistics`]: block-wise min/max/mean aggregation
//! - [`stats_cache`]: memoization of statistics results
//! - [`source`]: raster discovery in directories
//! - [`config`]: defaults and environment overrides
//! - [`service`]: [`SocService`], the entry point for request handlers

// ============================================================================
// Public modules
// ============================================================================

pub mod chunk_cache;
pub mod config;
pub mod error;
pub mod geometry;
pub mod geotiff;
pub mod point_query;
pub mod raster;
pub mod service;
pub mod source;
pub mod statistics;
pub mod stats_cache;

// ============================================================================
// Errors
// ============================================================================

pub use error::{
    AccessFault,
    ProjectionError,
    QueryError,
    Result,
};

// ============================================================================
// Raster Access
// ============================================================================

pub use raster::{
    Block,
    BlockWindows,
    Blocks,
    MemoryOpener,
    MemoryRaster,
    RasterHandle,
    RasterMetadata,
    RasterOpener,
    Sample,
};

pub use geotiff::{
    GeoTiffOpener,
    GeoTiffRaster,
};

// ============================================================================
// Point Queries
// ============================================================================

pub use point_query::{
    DEFAULT_BAND,
    DEFAULT_CRS,
    PointQuery,
    query_point,
    query_points,
};

// ============================================================================
// Statistics
// ============================================================================

pub use statistics::{
    RunningAggregate,
    SummaryStatistics,
    aggregate_file,
    compute_statistics,
};

pub use stats_cache::{
    StatisticsCache,
    StatisticsKey,
};

// ============================================================================
// Geometry & Projections
// ============================================================================

pub use geometry::{BlockWindow, PixelCell, Point};
pub use geometry::projection::{
    Crs,
    get_proj_string,
    is_geographic_crs,
    project_point,
    reproject,
};
pub use geometry::transform::GeoTransform;

// ============================================================================
// Discovery, Configuration & Service
// ============================================================================

pub use source::{
    ScanOptions,
    discover_rasters,
};

pub use config::QueryConfig;
pub use service::SocService;
