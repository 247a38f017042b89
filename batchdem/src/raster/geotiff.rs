//! Single-band GeoTIFF tiles.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use super::{bilinear, RasterSource};
use crate::error::{DemError, Result};
use crate::geometry::{BoundingBox, Coordinate};

/// GeoTIFF ModelPixelScaleTag.
const MODEL_PIXEL_SCALE: u16 = 33550;
/// GeoTIFF ModelTiepointTag.
const MODEL_TIEPOINT: u16 = 33922;
/// GDAL_NODATA, stored as ASCII.
const GDAL_NODATA: u16 = 42113;

/// Decoding buffers may need to hold a full 1/3 arc-second tile (~470 MB).
const DECODING_LIMIT: usize = 1024 * 1024 * 1024;

/// Opens GeoTIFF tiles georeferenced with a tiepoint and a pixel scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffSource;

/// A decoded GeoTIFF tile.
///
/// Samples are stored row-major from north to south, west to east.
#[derive(Debug)]
pub struct GeoTiffTile {
    path: PathBuf,
    data: Vec<f32>,
    width: usize,
    height: usize,
    /// Data envelope, i.e. the outer edges of the outer pixels.
    envelope: BoundingBox,
    pixel_width: f64,
    pixel_height: f64,
    no_data: Option<f32>,
}

impl GeoTiffTile {
    /// Decode a GeoTIFF file.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::RasterFormat`] for multi-band images or images
    /// without tiepoint/pixel-scale georeferencing.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?;

        let mut limits = Limits::default();
        limits.decoding_buffer_size = DECODING_LIMIT;
        limits.intermediate_buffer_size = DECODING_LIMIT;
        limits.ifd_value_size = DECODING_LIMIT;
        decoder = decoder.with_limits(limits);

        let bands = match decoder.find_tag(Tag::SamplesPerPixel)? {
            Some(value) => value.into_u32()?,
            None => 1,
        };
        if bands != 1 {
            return Err(DemError::RasterFormat {
                path: path.to_path_buf(),
                reason: format!(
                    "raster has {} bands but elevation data should have only one",
                    bands
                ),
            });
        }

        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);
        if width == 0 || height == 0 {
            return Err(DemError::RasterFormat {
                path: path.to_path_buf(),
                reason: "empty raster".to_string(),
            });
        }

        let (origin_x, origin_y, pixel_width, pixel_height) =
            read_georeferencing(&mut decoder, path)?;
        let no_data = read_no_data(&mut decoder);
        let data = decode_samples(&mut decoder)?;

        if data.len() != width * height {
            return Err(DemError::RasterFormat {
                path: path.to_path_buf(),
                reason: format!(
                    "expected {} samples for {}x{}, got {}",
                    width * height,
                    width,
                    height,
                    data.len()
                ),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            data,
            width,
            height,
            envelope: BoundingBox::new(
                origin_x,
                origin_y - height as f64 * pixel_height,
                origin_x + width as f64 * pixel_width,
                origin_y,
            ),
            pixel_width,
            pixel_height,
            no_data,
        })
    }

    /// Elevation at `c` using bilinear interpolation between pixel centres.
    ///
    /// Returns NaN if one of the surrounding pixels is no-data.
    pub fn value_at(&self, c: Coordinate) -> Result<f64> {
        if !self.envelope.contains(c) {
            return Err(DemError::PointOutsideData {
                x: c.x,
                y: c.y,
                min_x: self.envelope.min_x,
                min_y: self.envelope.min_y,
                max_x: self.envelope.max_x,
                max_y: self.envelope.max_y,
            });
        }

        let col = (c.x - self.envelope.min_x) / self.pixel_width - 0.5;
        let row = (self.envelope.max_y - c.y) / self.pixel_height - 0.5;

        Ok(bilinear(col, row, self.width, self.height, |col, row| {
            let v = self.data[row * self.width + col];
            if v.is_nan() || Some(v) == self.no_data {
                None
            } else {
                Some(v as f64)
            }
        }))
    }

    pub fn envelope(&self) -> BoundingBox {
        self.envelope
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterSource for GeoTiffSource {
    type Handle = GeoTiffTile;

    fn open(&self, path: &Path) -> Result<GeoTiffTile> {
        GeoTiffTile::from_file(path)
    }

    fn evaluate(&self, handle: &GeoTiffTile, c: Coordinate) -> Result<f64> {
        handle.value_at(c)
    }
}

/// Returns (origin x, origin y, pixel width, pixel height) of the
/// north-west corner.
fn read_georeferencing<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<(f64, f64, f64, f64)> {
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT));
    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE));

    match (tiepoint, scale) {
        (Ok(tiepoint), Ok(scale)) if tiepoint.len() >= 6 && scale.len() >= 2 => {
            // Tiepoint: [i, j, k, x, y, z] maps pixel (i, j) to (x, y)
            let (i, j) = (tiepoint[0], tiepoint[1]);
            let (pixel_width, pixel_height) = (scale[0], scale[1]);
            if pixel_width <= 0.0 || pixel_height <= 0.0 {
                return Err(DemError::RasterFormat {
                    path: path.to_path_buf(),
                    reason: format!("invalid pixel scale {} x {}", pixel_width, pixel_height),
                });
            }
            let origin_x = tiepoint[3] - i * pixel_width;
            let origin_y = tiepoint[4] + j * pixel_height;
            Ok((origin_x, origin_y, pixel_width, pixel_height))
        }
        _ => Err(DemError::RasterFormat {
            path: path.to_path_buf(),
            reason: "missing ModelTiepoint/ModelPixelScale tags".to_string(),
        }),
    }
}

fn read_no_data<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_end_matches('\0').trim().parse().ok())
}

fn decode_samples<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Vec<f32>> {
    let samples = match decoder.read_image()? {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
    };
    Ok(samples)
}
