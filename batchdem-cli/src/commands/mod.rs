use anyhow::{Context, Result};
use batchdem::{ElevationReader, RasterSource, ReaderBuilder};
use clap::ValueEnum;
use std::path::PathBuf;

pub mod batch;
pub mod lookup;
pub mod query;
pub mod tiles;

/// Raster format of the tile set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Single-band GeoTIFF tiles
    Geotiff,
    /// SRTM .hgt tiles
    Hgt,
}

/// Global options used to open the reader.
pub struct ReaderOptions {
    pub base_url: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl ReaderOptions {
    pub fn open<R: RasterSource>(self, raster: R) -> Result<ElevationReader<R>> {
        let mut builder = match self.base_url {
            Some(base) => ReaderBuilder::new(&base),
            None => ReaderBuilder::from_env().context(
                "BATCHDEM_BASE_URL environment variable not set. Use --base-url or set BATCHDEM_BASE_URL",
            )?,
        };

        builder = builder.timeout_secs(self.timeout_secs);
        if let Some(dir) = self.cache_dir {
            builder = builder.cache_dir(dir);
        }

        let base = builder.base().to_string();
        builder
            .build_with(raster)
            .with_context(|| format!("Failed to open tile set at {}", base))
    }
}

/// Text output for a value: the elevation, or `nodata` for NaN.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nodata".to_string()
    } else {
        format!("{:.2}", value)
    }
}
