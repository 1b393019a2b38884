//! GeoTIFF rasters decoded with the `tiff` crate.
//!
//! Strip and tile layouts are read chunk by chunk; a window read decodes only
//! the chunks it intersects, and decoded chunks live in a per-handle
//! [`ChunkCache`]. Geo-referencing comes from `ModelTransformationTag` or the
//! `ModelPixelScaleTag` + `ModelTiepointTag` pair, the CRS from the GeoKey
//! directory.
//!
//! Three nodata signals are honored: the `GDAL_NODATA` sentinel, NaN in float
//! rasters, and an alpha channel declared through `ExtraSamples` (alpha 0 is
//! masked).

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, warn};

use crate::chunk_cache::{ChunkCache, DecodedChunk};
use crate::config::DEFAULT_CHUNK_CACHE_BYTES;
use crate::error::{AccessFault, QueryError, Result};
use crate::geometry::BlockWindow;
use crate::geometry::projection::Crs;
use crate::geometry::transform::GeoTransform;
use crate::raster::{Block, RasterHandle, RasterMetadata, RasterOpener};

const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const GEO_KEY_RASTER_TYPE: u16 = 1025;
const GEO_KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const GEO_KEY_PROJECTED_CRS: u16 = 3072;

const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

const PLANAR_CONFIG_SEPARATE: u32 = 2;
const SAMPLE_FORMAT_IEEE_FP: u16 = 3;

const EXTRA_SAMPLE_ASSOCIATED_ALPHA: u16 = 1;
const EXTRA_SAMPLE_UNASSOCIATED_ALPHA: u16 = 2;

struct ChunkLayout {
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
    samples_per_pixel: usize,
    alpha_sample: Option<usize>,
}

impl ChunkLayout {
    /// Interleaved sample index of a 1-based data band, skipping the alpha
    /// sample.
    fn sample_index(&self, band: usize) -> usize {
        let index = band - 1;
        match self.alpha_sample {
            Some(alpha) if index >= alpha => index + 1,
            _ => index,
        }
    }
}

/// An open GeoTIFF file.
pub struct GeoTiffRaster {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    metadata: RasterMetadata,
    layout: ChunkLayout,
    cache: ChunkCache,
}

impl std::fmt::Debug for GeoTiffRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffRaster")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl GeoTiffRaster {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_cache(path, DEFAULT_CHUNK_CACHE_BYTES)
    }

    /// Open with a chunk cache bounded to `cache_bytes`.
    pub fn open_with_cache(path: impl AsRef<Path>, cache_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        let raster = open_geotiff(path, cache_bytes).map_err(|fault| QueryError::access(path, fault))?;
        debug!(
            path = %path.display(),
            width = raster.metadata.width,
            height = raster.metadata.height,
            bands = raster.metadata.bands,
            crs = ?raster.metadata.crs,
            nodata = ?raster.metadata.nodata,
            "Opened GeoTIFF"
        );
        Ok(raster)
    }

    /// Chunks currently held in this handle's cache.
    #[must_use]
    pub fn cached_chunks(&self) -> usize {
        self.cache.len()
    }

    fn fetch_chunk(&mut self, index: u32) -> std::result::Result<Arc<DecodedChunk>, AccessFault> {
        if let Some(chunk) = self.cache.get(index) {
            return Ok(chunk);
        }

        let (width, height) = self.decoder.chunk_data_dimensions(index);
        let (width, height) = (width as usize, height as usize);
        let values = widen(self.decoder.read_chunk(index)?);

        let expected = width * height * self.layout.samples_per_pixel;
        if values.len() != expected {
            return Err(AccessFault::Unsupported(format!(
                "chunk {index} decoded to {} samples (expected {expected})",
                values.len()
            )));
        }

        let chunk = Arc::new(DecodedChunk {
            width,
            height,
            samples_per_pixel: self.layout.samples_per_pixel,
            values,
        });
        self.cache.insert(index, Arc::clone(&chunk));
        Ok(chunk)
    }
}

impl RasterHandle for GeoTiffRaster {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read_window(&mut self, band: usize, window: BlockWindow) -> Result<Block> {
        self.metadata.check_band(band)?;
        self.metadata.check_window(window)?;

        let mut values = Array2::<f64>::zeros((window.height, window.width));
        let mut mask = Array2::from_elem((window.height, window.width), false);
        if window.is_empty() {
            return Ok(Block::new(window, values, mask));
        }

        let sample = self.layout.sample_index(band);
        let alpha = self.layout.alpha_sample;
        let (cw, ch) = (self.layout.chunk_width, self.layout.chunk_height);

        for chunk_row in window.row / ch..=(window.row_end() - 1) / ch {
            for chunk_col in window.col / cw..=(window.col_end() - 1) / cw {
                let index = chunk_row * self.layout.chunks_across + chunk_col;
                let index = u32::try_from(index).map_err(|_| {
                    QueryError::access(&self.path, AccessFault::Unsupported(format!("chunk index {index} overflows")))
                })?;
                let chunk = self
                    .fetch_chunk(index)
                    .map_err(|fault| QueryError::access(&self.path, fault))?;

                let (row0, col0) = (chunk_row * ch, chunk_col * cw);
                let rows = window.row.max(row0)..window.row_end().min(row0 + chunk.height);
                let cols = window.col.max(col0)..window.col_end().min(col0 + chunk.width);

                for r in rows {
                    for c in cols.clone() {
                        let v = chunk.sample(r - row0, c - col0, sample);
                        let transparent = alpha.is_some_and(|a| chunk.sample(r - row0, c - col0, a) == 0.0);
                        let idx = [r - window.row, c - window.col];
                        values[idx] = v;
                        mask[idx] = transparent || self.metadata.is_nodata(v);
                    }
                }
            }
        }

        Ok(Block::new(window, values, mask))
    }
}

/// Opens GeoTIFF files, each handle with its own chunk cache.
#[derive(Debug, Clone, Copy)]
pub struct GeoTiffOpener {
    pub chunk_cache_bytes: usize,
}

impl GeoTiffOpener {
    #[must_use]
    pub fn new(chunk_cache_bytes: usize) -> Self {
        Self { chunk_cache_bytes }
    }
}

impl Default for GeoTiffOpener {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_CACHE_BYTES)
    }
}

impl RasterOpener for GeoTiffOpener {
    type Handle = GeoTiffRaster;

    fn open(&self, path: &Path) -> Result<GeoTiffRaster> {
        GeoTiffRaster::open_with_cache(path, self.chunk_cache_bytes)
    }
}

fn open_geotiff(path: &Path, cache_bytes: usize) -> std::result::Result<GeoTiffRaster, AccessFault> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    if decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1) == PLANAR_CONFIG_SEPARATE {
        return Err(AccessFault::Unsupported("planar-separate sample layout".into()));
    }

    let samples_per_pixel = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1).max(1) as usize;
    let extra_samples = decoder.get_tag_u16_vec(Tag::ExtraSamples).unwrap_or_default();
    let alpha_sample = alpha_sample_index(samples_per_pixel, &extra_samples);
    let bands = samples_per_pixel - usize::from(alpha_sample.is_some());

    let sample_format = first_u16(&mut decoder, Tag::SampleFormat).unwrap_or(1);
    let bits_per_sample = first_u16(&mut decoder, Tag::BitsPerSample).unwrap_or(1);
    let is_float32 = sample_format == SAMPLE_FORMAT_IEEE_FP && bits_per_sample == 32;

    let geo_keys = decoder
        .get_tag_u16_vec(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))
        .ok();

    let mut transform = read_transform(&mut decoder)?;
    if geo_keys
        .as_deref()
        .and_then(|keys| geo_key_value(keys, GEO_KEY_RASTER_TYPE))
        == Some(RASTER_PIXEL_IS_POINT)
    {
        transform = transform.pixel_is_point_to_area();
    }

    let crs = geo_keys.as_deref().and_then(crs_from_geo_keys);
    if crs.is_none() {
        warn!(path = %path.display(), "GeoTIFF declares no CRS, assuming EPSG:4326");
    }

    // Compare the sentinel at sample precision: a "-3.4e38" sentinel only
    // matches f32 samples once rounded to f32.
    let nodata = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))
        .ok()
        .and_then(|s| parse_nodata(&s))
        .map(|v| if is_float32 { f64::from(v as f32) } else { v });

    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    let chunk_width = (chunk_width as usize).max(1);
    let chunk_height = (chunk_height as usize).max(1);

    Ok(GeoTiffRaster {
        path: path.to_path_buf(),
        decoder,
        metadata: RasterMetadata {
            width,
            height,
            bands,
            crs,
            nodata,
            transform,
        },
        layout: ChunkLayout {
            chunk_width,
            chunk_height,
            chunks_across: width.div_ceil(chunk_width),
            samples_per_pixel,
            alpha_sample,
        },
        cache: ChunkCache::new(cache_bytes),
    })
}

fn first_u16(decoder: &mut Decoder<BufReader<File>>, tag: Tag) -> Option<u16> {
    decoder.get_tag_u16_vec(tag).ok().and_then(|v| v.first().copied())
}

fn read_transform(decoder: &mut Decoder<BufReader<File>>) -> std::result::Result<GeoTransform, AccessFault> {
    if let Ok(m) = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_TRANSFORMATION))
        && let Ok(m) = <[f64; 16]>::try_from(m.as_slice())
    {
        return Ok(GeoTransform::from_model_transformation(&m));
    }

    let pixel_scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .ok()
        .and_then(|v| <[f64; 3]>::try_from(v.get(..3)?).ok());
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .ok()
        .and_then(|v| <[f64; 6]>::try_from(v.get(..6)?).ok());

    match (tiepoint, pixel_scale) {
        (Some(tiepoint), Some(scale)) if scale[0] != 0.0 && scale[1] != 0.0 => {
            Ok(GeoTransform::from_tiepoint(&tiepoint, &scale))
        }
        (Some(_), Some(_)) => Err(AccessFault::NotGeoreferenced("zero pixel scale".into())),
        _ => Err(AccessFault::NotGeoreferenced(
            "missing ModelTransformationTag and ModelPixelScaleTag/ModelTiepointTag".into(),
        )),
    }
}

/// Look up an inline (SHORT) value in a GeoKey directory.
///
/// Layout: a 4-value header (version, revision, minor, key count) followed
/// by one (key, location, count, value) quadruple per key.
fn geo_key_value(keys: &[u16], key: u16) -> Option<u16> {
    let count = usize::from(*keys.get(3)?);
    keys.get(4..)?
        .chunks_exact(4)
        .take(count)
        .find(|entry| entry[0] == key && entry[1] == 0)
        .map(|entry| entry[3])
}

fn crs_from_geo_keys(keys: &[u16]) -> Option<Crs> {
    [GEO_KEY_PROJECTED_CRS, GEO_KEY_GEOGRAPHIC_TYPE]
        .into_iter()
        .filter_map(|key| geo_key_value(keys, key))
        .find(|&code| code != 0 && code != USER_DEFINED)
        .map(|code| Crs::epsg(i32::from(code)))
}

/// Index of the alpha sample among `samples_per_pixel` interleaved samples.
///
/// `ExtraSamples` describes the trailing samples of each pixel.
fn alpha_sample_index(samples_per_pixel: usize, extra_samples: &[u16]) -> Option<usize> {
    let first_extra = samples_per_pixel.checked_sub(extra_samples.len())?;
    extra_samples
        .iter()
        .position(|&kind| kind == EXTRA_SAMPLE_ASSOCIATED_ALPHA || kind == EXTRA_SAMPLE_UNASSOCIATED_ALPHA)
        .map(|pos| first_extra + pos)
}

fn parse_nodata(raw: &str) -> Option<f64> {
    let s = raw.trim_end_matches('\0').trim();
    if s.eq_ignore_ascii_case("nan") {
        // NaN samples are always masked.
        return None;
    }
    s.parse().ok()
}

fn widen(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F16(data) => data.into_iter().map(|v| f64::from(f32::from(v))).collect(),
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::F64(data) => data,
    }
}
