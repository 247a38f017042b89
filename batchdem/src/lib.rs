//! # batchdem - Lazy elevation lookups over large tile sets
//!
//! Resolves coordinates to elevation values from a remote tile set that is
//! described by a manifest (`index.list.gz`). Tiles are downloaded,
//! decompressed and opened on first use, then kept for the lifetime of the
//! reader.
//!
//! ## Features
//!
//! - **Spatial index**: R-tree over the manifest bounding boxes
//! - **Fetch once**: at most one download and one open per tile, even with
//!   many query threads
//! - **Crash safe cache**: tiles are published to the cache directory by
//!   atomic rename, never half written
//! - **Raster sources**: single-band GeoTIFF and SRTM `.hgt` tiles
//!
//! ## Quick Start
//!
//! ```ignore
//! use batchdem::{Coordinate, ElevationReader};
//!
//! let reader = ElevationReader::open("https://example.com/dem", None)?;
//!
//! // x is longitude, y is latitude
//! let value = reader.get_value_at(Coordinate::new(134.25, 0.75))?;
//! if value.is_nan() {
//!     println!("no elevation data");
//! } else {
//!     println!("Elevation: {:.1}m", value);
//! }
//!
//! reader.close();
//! ```
//!
//! ## Tile Set Layout
//!
//! ```text
//! <base>/index.list.gz        gzipped manifest
//! <base>/N00E134.tif.bz2      bzip2 compressed tiles
//! ```
//!
//! Manifest lines are `identifier,min_x,min_y,max_x,max_y`; lines starting
//! with `#` are comments and extra fields are ignored.

pub mod error;
pub mod fetch;
pub mod geometry;
pub mod handles;
pub mod keyed_lock;
pub mod raster;
pub mod reader;
pub mod registry;
pub mod store;

// Re-export main types at crate root for convenience
pub use error::{DemError, Result};
#[cfg(feature = "http")]
pub use fetch::HttpSource;
pub use fetch::{Compression, DirectorySource, FetchStats, TileFetcher, TileSource};
pub use geometry::{BoundingBox, Coordinate};
pub use handles::TileHandleCache;
pub use keyed_lock::KeyedLock;
pub use raster::{GeoTiffSource, GeoTiffTile, HgtResolution, HgtSource, HgtTile, RasterSource};
pub use reader::{ElevationReader, ReaderBuilder, ReaderStats};
pub use registry::{TileEntry, TileRegistry};
pub use store::{Published, TileCacheStore};
