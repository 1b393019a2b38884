//! GeoTIFF fixtures written with the `tiff` encoder.

#![allow(dead_code)]

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use tiff::encoder::colortype::ColorType;
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::Tag;

const GEOTIFF_MODELPIXELSCALE: u16 = 33550;
const GEOTIFF_MODELTIEPOINT: u16 = 33922;
const GEOTIFF_MODELTRANSFORMATION: u16 = 34264;
const GEOTIFF_GEOKEYDIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

/// How the fixture is geo-referenced.
#[derive(Debug, Clone, Copy)]
pub enum Georef {
    /// ModelTiepoint at grid (0, 0) plus ModelPixelScale
    Tiepoint { origin: (f64, f64), pixel: (f64, f64) },
    /// Full 4x4 ModelTransformation
    Transformation([f64; 16]),
    None,
}

#[derive(Debug, Clone)]
pub struct GeoTiffFixture {
    pub width: u32,
    pub height: u32,
    pub georef: Georef,
    pub epsg: Option<u16>,
    pub nodata: Option<String>,
    pub rows_per_strip: u32,
    pub pixel_is_point: bool,
    pub extra_samples: Option<Vec<u16>>,
}

impl GeoTiffFixture {
    /// North-up WGS84 raster anchored at its top-left corner.
    pub fn lonlat(width: u32, height: u32, origin: (f64, f64), pixel: f64) -> Self {
        Self {
            width,
            height,
            georef: Georef::Tiepoint {
                origin,
                pixel: (pixel, pixel),
            },
            epsg: Some(4326),
            nodata: None,
            rows_per_strip: height,
            pixel_is_point: false,
            extra_samples: None,
        }
    }

    pub fn epsg(mut self, code: Option<u16>) -> Self {
        self.epsg = code;
        self
    }

    pub fn nodata(mut self, nodata: &str) -> Self {
        self.nodata = Some(nodata.to_string());
        self
    }

    pub fn rows_per_strip(mut self, rows: u32) -> Self {
        self.rows_per_strip = rows;
        self
    }

    pub fn georef(mut self, georef: Georef) -> Self {
        self.georef = georef;
        self
    }

    pub fn pixel_is_point(mut self) -> Self {
        self.pixel_is_point = true;
        self
    }

    pub fn extra_samples(mut self, kinds: &[u16]) -> Self {
        self.extra_samples = Some(kinds.to_vec());
        self
    }

    /// Write `data` (row-major, interleaved samples) as a striped GeoTIFF.
    pub fn write<C>(&self, path: &Path, data: &[C::Inner])
    where
        C: ColorType,
        [C::Inner]: TiffValue,
    {
        let file = BufWriter::new(File::create(path).expect("create fixture"));
        let mut encoder = TiffEncoder::new(file).expect("tiff encoder");
        let mut image = encoder
            .new_image::<C>(self.width, self.height)
            .expect("new image");
        image.rows_per_strip(self.rows_per_strip).expect("rows per strip");
        self.write_geotiff_tags(image.encoder());
        image.write_data(data).expect("write pixels");
    }

    /// Write `data` (row-major, one f32 sample per cell) as an uncompressed
    /// tiled GeoTIFF with square `tile` x `tile` tiles.
    ///
    /// The `tiff` encoder only produces strips, so the IFD is assembled here.
    /// Edge tiles are padded to full size as TIFF requires.
    pub fn write_tiled(&self, path: &Path, data: &[f32], tile: u32) {
        assert_eq!(data.len(), (self.width * self.height) as usize, "data does not match grid");

        // Header, patched with the IFD offset at the end.
        let mut buf: Vec<u8> = b"II\x2a\x00\0\0\0\0".to_vec();

        let across = self.width.div_ceil(tile);
        let down = self.height.div_ceil(tile);
        let mut offsets = Vec::new();
        let mut byte_counts = Vec::new();
        for tile_row in 0..down {
            for tile_col in 0..across {
                offsets.push(buf.len() as u32);
                for r in tile_row * tile..(tile_row + 1) * tile {
                    for c in tile_col * tile..(tile_col + 1) * tile {
                        let v = if r < self.height && c < self.width {
                            data[(r * self.width + c) as usize]
                        } else {
                            0.0
                        };
                        buf.extend_from_slice(&v.to_le_bytes());
                    }
                }
                byte_counts.push(tile * tile * 4);
            }
        }

        let mut entries = vec![
            IfdEntry::long(256, &[self.width]),
            IfdEntry::long(257, &[self.height]),
            IfdEntry::short(258, &[32]),
            IfdEntry::short(259, &[1]),
            IfdEntry::short(262, &[1]),
            IfdEntry::short(277, &[1]),
            IfdEntry::short(284, &[1]),
            IfdEntry::long(322, &[tile]),
            IfdEntry::long(323, &[tile]),
            IfdEntry::long(324, &offsets),
            IfdEntry::long(325, &byte_counts),
            IfdEntry::short(339, &[3]),
        ];
        match self.georef {
            Georef::Tiepoint { origin, pixel } => {
                entries.push(IfdEntry::double(GEOTIFF_MODELPIXELSCALE, &[pixel.0, pixel.1, 0.0]));
                entries.push(IfdEntry::double(
                    GEOTIFF_MODELTIEPOINT,
                    &[0.0, 0.0, 0.0, origin.0, origin.1, 0.0],
                ));
            }
            Georef::Transformation(m) => entries.push(IfdEntry::double(GEOTIFF_MODELTRANSFORMATION, &m)),
            Georef::None => {}
        }
        let geokeys = self.geokey_directory();
        if geokeys.len() > 4 {
            entries.push(IfdEntry::short(GEOTIFF_GEOKEYDIRECTORY, &geokeys));
        }
        if let Some(nodata) = &self.nodata {
            entries.push(IfdEntry::ascii(GDAL_NODATA, nodata));
        }
        entries.sort_by_key(|e| e.tag);

        // Out-of-line values first, then the IFD itself.
        let mut value_offsets = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.payload.len() > 4 {
                if buf.len() % 2 == 1 {
                    buf.push(0);
                }
                value_offsets.push(Some(buf.len() as u32));
                buf.extend_from_slice(&entry.payload);
            } else {
                value_offsets.push(None);
            }
        }
        if buf.len() % 2 == 1 {
            buf.push(0);
        }

        let ifd_offset = buf.len() as u32;
        buf[4..8].copy_from_slice(&ifd_offset.to_le_bytes());
        buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (entry, offset) in entries.iter().zip(value_offsets) {
            buf.extend_from_slice(&entry.tag.to_le_bytes());
            buf.extend_from_slice(&entry.field_type.to_le_bytes());
            buf.extend_from_slice(&entry.count.to_le_bytes());
            match offset {
                Some(offset) => buf.extend_from_slice(&offset.to_le_bytes()),
                None => {
                    let mut inline = [0u8; 4];
                    inline[..entry.payload.len()].copy_from_slice(&entry.payload);
                    buf.extend_from_slice(&inline);
                }
            }
        }
        buf.extend_from_slice(&0u32.to_le_bytes());

        std::fs::write(path, buf).expect("write tiled fixture");
    }

    fn write_geotiff_tags<W: Write + Seek, K: TiffKind>(&self, dir: &mut DirectoryEncoder<W, K>) {
        match self.georef {
            Georef::Tiepoint { origin, pixel } => {
                let pixel_scale = [pixel.0, pixel.1, 0.0];
                dir.write_tag(Tag::Unknown(GEOTIFF_MODELPIXELSCALE), pixel_scale.as_slice())
                    .unwrap();
                let tiepoint = [0.0, 0.0, 0.0, origin.0, origin.1, 0.0];
                dir.write_tag(Tag::Unknown(GEOTIFF_MODELTIEPOINT), tiepoint.as_slice())
                    .unwrap();
            }
            Georef::Transformation(m) => {
                dir.write_tag(Tag::Unknown(GEOTIFF_MODELTRANSFORMATION), m.as_slice())
                    .unwrap();
            }
            Georef::None => {}
        }

        let geokeys = self.geokey_directory();
        if geokeys.len() > 4 {
            dir.write_tag(Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY), geokeys.as_slice())
                .unwrap();
        }

        if let Some(nodata) = &self.nodata {
            dir.write_tag(Tag::Unknown(GDAL_NODATA), nodata.as_str()).unwrap();
        }

        if let Some(kinds) = &self.extra_samples {
            dir.write_tag(Tag::ExtraSamples, kinds.as_slice()).unwrap();
        }
    }

    fn geokey_directory(&self) -> Vec<u16> {
        let mut entries: Vec<[u16; 4]> = Vec::new();

        if let Some(code) = self.epsg {
            let geographic = (4000..5000).contains(&code);
            entries.push([GT_MODEL_TYPE_GEO_KEY, 0, 1, if geographic { 2 } else { 1 }]);
            entries.push([GT_RASTER_TYPE_GEO_KEY, 0, 1, if self.pixel_is_point { 2 } else { 1 }]);
            let key = if geographic {
                GEOGRAPHIC_TYPE_GEO_KEY
            } else {
                PROJECTED_CS_TYPE_GEO_KEY
            };
            entries.push([key, 0, 1, code]);
        } else if self.pixel_is_point {
            entries.push([GT_RASTER_TYPE_GEO_KEY, 0, 1, 2]);
        }

        let mut keys = vec![1, 1, 0, entries.len() as u16];
        keys.extend(entries.into_iter().flatten());
        keys
    }
}

/// One little-endian IFD entry with its encoded value.
struct IfdEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    payload: Vec<u8>,
}

impl IfdEntry {
    fn short(tag: u16, values: &[u16]) -> Self {
        Self {
            tag,
            field_type: 3,
            count: values.len() as u32,
            payload: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn long(tag: u16, values: &[u32]) -> Self {
        Self {
            tag,
            field_type: 4,
            count: values.len() as u32,
            payload: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn double(tag: u16, values: &[f64]) -> Self {
        Self {
            tag,
            field_type: 12,
            count: values.len() as u32,
            payload: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn ascii(tag: u16, value: &str) -> Self {
        let mut payload = value.as_bytes().to_vec();
        payload.push(0);
        Self {
            tag,
            field_type: 2,
            count: payload.len() as u32,
            payload,
        }
    }
}

/// Deterministic pseudo-random values in `[lo, hi)`.
pub fn lcg_values(seed: u64, n: usize, lo: f32, hi: f32) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
            lo + unit * (hi - lo)
        })
        .collect()
}

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
