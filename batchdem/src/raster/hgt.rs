//! SRTM `.hgt` tiles.
//!
//! An `.hgt` file is a square grid of big-endian `i16` samples stored north
//! to south, west to east, with no header. The grid size is inferred from
//! the file size and the south-west corner from the file name
//! (`{N|S}{lat:02}{E|W}{lon:03}.hgt`). Samples sit on whole and fractional
//! arc-seconds, so the outermost rows and columns lie on the tile edges.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::{bilinear, RasterSource};
use crate::error::{DemError, Result};
use crate::geometry::{BoundingBox, Coordinate};

const SRTM1_SAMPLES: usize = 3601;
const SRTM3_SAMPLES: usize = 1201;

const SRTM1_SIZE: usize = SRTM1_SAMPLES * SRTM1_SAMPLES * 2;
const SRTM3_SIZE: usize = SRTM3_SAMPLES * SRTM3_SAMPLES * 2;

/// Void marker in SRTM files.
pub const VOID_VALUE: i16 = -32768;

/// Grid resolution of an `.hgt` tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HgtResolution {
    /// 1 arc-second, 3601 x 3601 samples.
    Srtm1,
    /// 3 arc-second, 1201 x 1201 samples.
    Srtm3,
}

impl HgtResolution {
    pub fn samples(&self) -> usize {
        match self {
            HgtResolution::Srtm1 => SRTM1_SAMPLES,
            HgtResolution::Srtm3 => SRTM3_SAMPLES,
        }
    }

    fn from_file_size(size: usize) -> Option<Self> {
        match size {
            SRTM1_SIZE => Some(HgtResolution::Srtm1),
            SRTM3_SIZE => Some(HgtResolution::Srtm3),
            _ => None,
        }
    }
}

/// Opens memory-mapped `.hgt` tiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct HgtSource;

/// A memory-mapped `.hgt` tile.
pub struct HgtTile {
    path: PathBuf,
    data: Mmap,
    resolution: HgtResolution,
    base_lat: i32,
    base_lon: i32,
}

impl HgtTile {
    /// Map a tile, reading its origin from the file name.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let (base_lat, base_lon) =
            parse_origin(&name).ok_or_else(|| DemError::RasterFormat {
                path: path.to_path_buf(),
                reason: format!("cannot derive tile origin from name '{}'", name),
            })?;
        Self::from_file_with_origin(path, base_lat, base_lon)
    }

    /// Map a tile whose south-west corner is `(base_lat, base_lon)`.
    pub fn from_file_with_origin<P: AsRef<Path>>(
        path: P,
        base_lat: i32,
        base_lon: i32,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // SAFETY: cached tiles are published once by rename and never
        // modified afterwards.
        let data = unsafe { Mmap::map(&file)? };

        let resolution =
            HgtResolution::from_file_size(data.len()).ok_or_else(|| DemError::RasterFormat {
                path: path.to_path_buf(),
                reason: format!("unexpected .hgt file size {}", data.len()),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            data,
            resolution,
            base_lat,
            base_lon,
        })
    }

    /// Elevation at `c` interpolated between the four surrounding samples.
    ///
    /// Returns NaN if one of them is void.
    pub fn value_at(&self, c: Coordinate) -> Result<f64> {
        let envelope = self.envelope();
        if !envelope.contains(c) {
            return Err(DemError::PointOutsideData {
                x: c.x,
                y: c.y,
                min_x: envelope.min_x,
                min_y: envelope.min_y,
                max_x: envelope.max_x,
                max_y: envelope.max_y,
            });
        }

        let samples = self.resolution.samples();
        let steps = (samples - 1) as f64;
        // Row 0 is the north edge
        let col = (c.x - self.base_lon as f64) * steps;
        let row = (envelope.max_y - c.y) * steps;

        Ok(bilinear(col, row, samples, samples, |col, row| {
            let offset = (row * samples + col) * 2;
            let v = i16::from_be_bytes([self.data[offset], self.data[offset + 1]]);
            (v != VOID_VALUE).then_some(v as f64)
        }))
    }

    /// The 1 x 1 degree area covered by the tile.
    pub fn envelope(&self) -> BoundingBox {
        let min_x = self.base_lon as f64;
        let min_y = self.base_lat as f64;
        BoundingBox::new(min_x, min_y, min_x + 1.0, min_y + 1.0)
    }

    pub fn resolution(&self) -> HgtResolution {
        self.resolution
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterSource for HgtSource {
    type Handle = HgtTile;

    fn open(&self, path: &Path) -> Result<HgtTile> {
        HgtTile::from_file(path)
    }

    fn evaluate(&self, handle: &HgtTile, c: Coordinate) -> Result<f64> {
        handle.value_at(c)
    }
}

/// South-west corner `(lat, lon)` from an `.hgt` file name such as
/// `N35E138.hgt` or `s12w077.hgt`.
fn parse_origin(name: &str) -> Option<(i32, i32)> {
    let lower = name.to_ascii_lowercase();
    let stem = lower.strip_suffix(".hgt").unwrap_or(&lower);
    if stem.len() != 7 || !stem.is_ascii() {
        return None;
    }

    let lat_sign = match &stem[0..1] {
        "n" => 1,
        "s" => -1,
        _ => return None,
    };
    let lon_sign = match &stem[3..4] {
        "e" => 1,
        "w" => -1,
        _ => return None,
    };
    let lat: i32 = stem[1..3].parse().ok()?;
    let lon: i32 = stem[4..7].parse().ok()?;

    Some((lat * lat_sign, lon * lon_sign))
}
