//! Raster sources: opening cached tiles and sampling them.
//!
//! An [`crate::ElevationReader`] is generic over a [`RasterSource`], which
//! turns a decompressed tile file into a handle and evaluates coordinates
//! against it. Two sources ship with the crate:
//!
//! - [`GeoTiffSource`]: single-band GeoTIFF tiles (the default)
//! - [`HgtSource`]: SRTM `.hgt` tiles, georeferenced by file name

mod geotiff;
mod hgt;

pub use geotiff::{GeoTiffSource, GeoTiffTile};
pub use hgt::{HgtResolution, HgtSource, HgtTile, VOID_VALUE};

use std::path::Path;

use crate::error::Result;
use crate::geometry::Coordinate;

/// Opens tile files and evaluates elevation on them.
///
/// Handles are shared between threads once opened, and `evaluate` is
/// called concurrently without any locking.
pub trait RasterSource: Send + Sync {
    /// An opened, ready-to-query tile.
    type Handle: Send + Sync + 'static;

    /// Open a decompressed tile file.
    ///
    /// Must fail with [`crate::DemError::RasterFormat`] unless the file
    /// holds exactly one sample band.
    fn open(&self, path: &Path) -> Result<Self::Handle>;

    /// Elevation at `c`, NaN for no-data samples.
    ///
    /// Must fail with [`crate::DemError::PointOutsideData`] when `c` is
    /// outside the data envelope of the handle.
    fn evaluate(&self, handle: &Self::Handle, c: Coordinate) -> Result<f64>;
}

/// Bilinear interpolation on a grid of `width` x `height` samples.
///
/// `col` and `row` are fractional sample positions; they are clamped to
/// the grid so that points between the outermost sample and the data edge
/// use the nearest edge samples. `sample` returns `None` for no-data, in
/// which case the result is NaN.
pub(crate) fn bilinear(
    col: f64,
    row: f64,
    width: usize,
    height: usize,
    sample: impl Fn(usize, usize) -> Option<f64>,
) -> f64 {
    let col = col.clamp(0.0, (width - 1) as f64);
    let row = row.clamp(0.0, (height - 1) as f64);

    let c0 = col.floor() as usize;
    let r0 = row.floor() as usize;
    let c1 = (c0 + 1).min(width - 1);
    let r1 = (r0 + 1).min(height - 1);

    let dx = col - c0 as f64;
    let dy = row - r0 as f64;

    let (Some(v00), Some(v10), Some(v01), Some(v11)) = (
        sample(c0, r0),
        sample(c1, r0),
        sample(c0, r1),
        sample(c1, r1),
    ) else {
        return f64::NAN;
    };

    let top = v00 * (1.0 - dx) + v10 * dx;
    let bottom = v01 * (1.0 - dx) + v11 * dx;
    top * (1.0 - dy) + bottom * dy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(col: usize, row: usize) -> Option<f64> {
        // 2x2 grid: 0 10 / 20 30
        Some((row * 20 + col * 10) as f64)
    }

    #[test]
    fn test_bilinear_corners_and_center() {
        assert_eq!(bilinear(0.0, 0.0, 2, 2, grid), 0.0);
        assert_eq!(bilinear(1.0, 0.0, 2, 2, grid), 10.0);
        assert_eq!(bilinear(0.0, 1.0, 2, 2, grid), 20.0);
        assert_eq!(bilinear(1.0, 1.0, 2, 2, grid), 30.0);
        assert_eq!(bilinear(0.5, 0.5, 2, 2, grid), 15.0);
    }

    #[test]
    fn test_bilinear_clamps_to_edges() {
        assert_eq!(bilinear(-0.5, -0.5, 2, 2, grid), 0.0);
        assert_eq!(bilinear(1.5, 1.5, 2, 2, grid), 30.0);
    }

    #[test]
    fn test_bilinear_no_data() {
        let value = bilinear(0.5, 0.5, 2, 2, |c, r| {
            if c == 1 && r == 1 {
                None
            } else {
                Some(1.0)
            }
        });
        assert!(value.is_nan());
    }
}
