//! Elevation queries over a lazily fetched tile set.
//!
//! [`ElevationReader`] ties the pieces together: a coordinate is resolved
//! to a tile identifier by the [`TileRegistry`], the tile is fetched into
//! the [`TileCacheStore`] and opened once under a [`KeyedLock`], and the
//! value is evaluated by the [`RasterSource`] outside the lock.
//!
//! # Example
//!
//! ```ignore
//! use batchdem::{Coordinate, ElevationReader};
//!
//! let reader = ElevationReader::open("https://example.com/dem", None)?;
//! let value = reader.get_value_at(Coordinate::new(134.5, 0.5))?;
//! if value.is_nan() {
//!     println!("no data");
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{DemError, Result};
use crate::fetch::{source_for_base, TileFetcher, TileSource, DEFAULT_TIMEOUT_SECS};
use crate::geometry::Coordinate;
use crate::handles::TileHandleCache;
use crate::keyed_lock::{KeyedLock, DEFAULT_STRIPES};
use crate::raster::{GeoTiffSource, RasterSource};
use crate::registry::TileRegistry;
use crate::store::TileCacheStore;

/// Counters collected by a reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderStats {
    /// Calls to `get_value_at`.
    pub lookups: u64,
    /// Lookups outside every indexed tile.
    pub misses: u64,
    /// Lookups served by an already opened tile.
    pub handle_hits: u64,
    /// Tiles opened by the raster source.
    pub handles_opened: u64,
    /// Tiles downloaded into the cache directory.
    pub tiles_fetched: u64,
    /// Decompressed bytes written to the cache directory.
    pub bytes_written: u64,
}

impl ReaderStats {
    /// Fraction of lookups that found a covering tile (0.0 to 1.0).
    ///
    /// Returns 0.0 if no lookups have been made.
    pub fn coverage_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            (self.lookups - self.misses) as f64 / self.lookups as f64
        }
    }
}

/// Resolves coordinates to elevation values.
///
/// Safe to share between threads: queries for different tiles proceed in
/// parallel, and each tile is fetched and opened at most once per reader.
pub struct ElevationReader<R: RasterSource = GeoTiffSource> {
    registry: TileRegistry,
    locks: KeyedLock,
    store: TileCacheStore,
    fetcher: TileFetcher,
    handles: TileHandleCache<R::Handle>,
    raster: R,
    lookups: AtomicU64,
    misses: AtomicU64,
}

impl ElevationReader<GeoTiffSource> {
    /// Open a GeoTIFF tile set.
    ///
    /// `base` is an `http(s)://` URL or a local directory holding
    /// `index.list.gz` and the tiles. Without `cache_dir` tiles are kept
    /// in `<system temp>/dem`.
    ///
    /// # Errors
    ///
    /// Fails if the manifest cannot be fetched or has no usable entries.
    pub fn open(base: &str, cache_dir: Option<&Path>) -> Result<Self> {
        let mut builder = ReaderBuilder::new(base);
        if let Some(dir) = cache_dir {
            builder = builder.cache_dir(dir);
        }
        builder.build()
    }

    /// Create a builder for more configuration options.
    pub fn builder(base: &str) -> ReaderBuilder {
        ReaderBuilder::new(base)
    }
}

impl<R: RasterSource> ElevationReader<R> {
    /// Elevation at `c`.
    ///
    /// Returns NaN when no indexed tile covers `c` (no lock is taken and no
    /// I/O happens) or when the raster has no data there.
    ///
    /// # Errors
    ///
    /// Fetch, storage and raster errors of the covering tile are returned
    /// as-is and not remembered: the next call for the same tile tries
    /// again. [`DemError::PointOutsideData`] means the manifest box and the
    /// tile data disagree.
    pub fn get_value_at(&self, c: Coordinate) -> Result<f64> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let Some(identifier) = self.registry.lookup(c) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(f64::NAN);
        };

        let handle = match self.handles.get(identifier) {
            Some(handle) => handle,
            None => self.locks.with_lock(identifier, || {
                let path = self.fetcher.ensure_cached(&self.store, identifier)?;
                self.handles.get_or_open(identifier, || {
                    tracing::debug!(identifier, path = %path.display(), "opening tile");
                    self.raster.open(&path)
                })
            })?,
        };

        self.raster.evaluate(&handle, c)
    }

    /// Elevations for a slice of coordinates, in order.
    ///
    /// Stops at the first error.
    pub fn get_values_at(&self, coords: &[Coordinate]) -> Result<Vec<f64>> {
        coords.iter().map(|&c| self.get_value_at(c)).collect()
    }

    /// Release every opened tile.
    ///
    /// Callers must make sure no query is running. Calling `close` again is
    /// a no-op, and a later query simply reopens its tile from the cache
    /// directory.
    pub fn close(&self) {
        tracing::debug!(open_tiles = self.handles.len(), "closing reader");
        self.handles.clear();
    }

    pub fn registry(&self) -> &TileRegistry {
        &self.registry
    }

    pub fn store(&self) -> &TileCacheStore {
        &self.store
    }

    pub fn raster(&self) -> &R {
        &self.raster
    }

    pub fn stats(&self) -> ReaderStats {
        let fetch = self.fetcher.stats();
        ReaderStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            handle_hits: self.handles.hit_count(),
            handles_opened: self.handles.open_count(),
            tiles_fetched: fetch.tiles_fetched,
            bytes_written: fetch.bytes_written,
        }
    }
}

/// Builder for [`ElevationReader`].
///
/// # Example
///
/// ```ignore
/// use batchdem::{HgtSource, ReaderBuilder};
///
/// let reader = ReaderBuilder::new("https://example.com/srtm")
///     .cache_dir("/data/dem-cache")
///     .lock_stripes(4096)
///     .build_with(HgtSource)?;
/// ```
pub struct ReaderBuilder {
    base: String,
    cache_dir: Option<PathBuf>,
    lock_stripes: usize,
    timeout_secs: u64,
    source: Option<Box<dyn TileSource>>,
}

impl ReaderBuilder {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            cache_dir: None,
            lock_stripes: DEFAULT_STRIPES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            source: None,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `BATCHDEM_BASE_URL` | Tile set URL or directory | Required |
    /// | `BATCHDEM_CACHE_DIR` | Local tile cache | `<temp>/dem` |
    /// | `BATCHDEM_LOCK_STRIPES` | Number of fetch lock stripes | 1000 |
    /// | `BATCHDEM_TIMEOUT_SECS` | HTTP timeout, 0 disables it | 300 |
    ///
    /// # Errors
    ///
    /// Returns [`DemError::Config`] if `BATCHDEM_BASE_URL` is not set or a
    /// numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        let base = std::env::var("BATCHDEM_BASE_URL").map_err(|_| DemError::Config {
            reason: "BATCHDEM_BASE_URL environment variable not set".to_string(),
        })?;

        let mut builder = Self::new(&base);
        if let Ok(dir) = std::env::var("BATCHDEM_CACHE_DIR") {
            builder = builder.cache_dir(dir);
        }
        if let Some(stripes) = env_number("BATCHDEM_LOCK_STRIPES")? {
            builder = builder.lock_stripes(stripes as usize);
        }
        if let Some(timeout) = env_number("BATCHDEM_TIMEOUT_SECS")? {
            builder = builder.timeout_secs(timeout);
        }
        Ok(builder)
    }

    /// Set the local cache directory.
    pub fn cache_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the number of lock stripes. Default is 1000.
    pub fn lock_stripes(mut self, stripes: usize) -> Self {
        self.lock_stripes = stripes;
        self
    }

    /// Set the HTTP request timeout. Default is 300 seconds.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Read the manifest and tiles from `source` instead of the base.
    pub fn source(mut self, source: impl TileSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Build a reader over GeoTIFF tiles.
    pub fn build(self) -> Result<ElevationReader<GeoTiffSource>> {
        self.build_with(GeoTiffSource)
    }

    /// Build a reader over tiles opened by `raster`.
    ///
    /// Fetches and parses the manifest before returning.
    pub fn build_with<R: RasterSource>(self, raster: R) -> Result<ElevationReader<R>> {
        let source = match self.source {
            Some(source) => source,
            None => source_for_base(&self.base, self.timeout_secs)?,
        };
        let fetcher = TileFetcher::new(source);
        let registry = fetcher.load_registry()?;

        let cache_dir = self.cache_dir.unwrap_or_else(TileCacheStore::default_dir);
        let store = TileCacheStore::new(cache_dir)?;

        tracing::info!(
            base = %fetcher.source().describe(),
            tiles = registry.len(),
            cache_dir = %store.dir().display(),
            "opened tile set"
        );

        Ok(ElevationReader {
            registry,
            locks: KeyedLock::new(self.lock_stripes),
            store,
            fetcher,
            handles: TileHandleCache::new(),
            raster,
            lookups: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }
}

fn env_number(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DemError::Config {
                reason: format!("{} must be a non-negative integer, got '{}'", name, value),
            }),
        Err(_) => Ok(None),
    }
}
