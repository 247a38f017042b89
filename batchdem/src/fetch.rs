//! Remote tile retrieval.
//!
//! A tile set is a flat folder of compressed tiles plus a gzipped manifest
//! named `index.list.gz`. The folder is reached through a [`TileSource`]:
//!
//! - [`HttpSource`] for `http://` and `https://` bases (requires the `http` feature)
//! - [`DirectorySource`] for local mirrors, given as a path or `file://` URL
//!
//! [`TileFetcher`] downloads a tile, decompresses it while streaming and
//! publishes it into a [`TileCacheStore`].

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;

use crate::error::{DemError, Result};
use crate::registry::TileRegistry;
use crate::store::TileCacheStore;

/// Name of the manifest resource in every tile set.
pub const MANIFEST_NAME: &str = "index.list.gz";

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Compression format of a remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Stored as-is
    #[default]
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// Bzip2 compression (.bz2)
    Bzip2,
}

impl Compression {
    /// Detect compression format from a resource name.
    ///
    /// # Examples
    ///
    /// ```
    /// use batchdem::fetch::Compression;
    ///
    /// assert_eq!(Compression::from_name("N00E134.tif.bz2"), Compression::Bzip2);
    /// assert_eq!(Compression::from_name("index.list.gz"), Compression::Gzip);
    /// assert_eq!(Compression::from_name("N00E134.tif"), Compression::None);
    /// ```
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.ends_with(".bz2") {
            Compression::Bzip2
        } else if lower.ends_with(".gz") {
            Compression::Gzip
        } else {
            Compression::None
        }
    }

    /// Wrap a raw stream in the matching decoder.
    pub fn decoder(self, stream: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        match self {
            Compression::None => stream,
            Compression::Gzip => Box::new(MultiGzDecoder::new(stream)),
            Compression::Bzip2 => Box::new(BzDecoder::new(stream)),
        }
    }
}

/// Where tile resources are read from.
pub trait TileSource: Send + Sync {
    /// Open the resource `name`, relative to the tile set base.
    ///
    /// Fails with [`DemError::Network`] if the resource is unavailable.
    fn open(&self, name: &str) -> Result<Box<dyn Read + Send>>;

    /// Human readable base location, used in logs.
    fn describe(&self) -> String;
}

/// Pick a [`TileSource`] for a base location.
///
/// `http://` and `https://` bases are fetched over the network; anything
/// else is treated as a local directory, with an optional `file://` prefix.
pub fn source_for_base(base: &str, timeout_secs: u64) -> Result<Box<dyn TileSource>> {
    let lower = base.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        #[cfg(feature = "http")]
        {
            return Ok(Box::new(HttpSource::new(base, timeout_secs)?));
        }

        #[cfg(not(feature = "http"))]
        {
            let _ = timeout_secs;
            return Err(DemError::InvalidBaseUrl {
                url: base.to_string(),
                reason: "built without the `http` feature".to_string(),
            });
        }
    }

    let path = base.strip_prefix("file://").unwrap_or(base);
    Ok(Box::new(DirectorySource::new(path)?))
}

/// Tile set served over HTTP(S).
#[cfg(feature = "http")]
pub struct HttpSource {
    client: reqwest::blocking::Client,
    base: reqwest::Url,
}

#[cfg(feature = "http")]
impl HttpSource {
    /// Create a source for `base`. A `timeout_secs` of 0 disables the timeout.
    pub fn new(base: &str, timeout_secs: u64) -> Result<Self> {
        // Url::join replaces the last path segment unless the base ends in '/'
        let normalized = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{}/", base)
        };
        let base = reqwest::Url::parse(&normalized).map_err(|e| DemError::InvalidBaseUrl {
            url: normalized.clone(),
            reason: e.to_string(),
        })?;

        let timeout = (timeout_secs > 0).then(|| std::time::Duration::from_secs(timeout_secs));
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self { client, base })
    }

    /// Full URL of a resource.
    pub fn url_for(&self, name: &str) -> Result<reqwest::Url> {
        self.base.join(name).map_err(|e| DemError::InvalidBaseUrl {
            url: format!("{}{}", self.base, name),
            reason: e.to_string(),
        })
    }
}

#[cfg(feature = "http")]
impl TileSource for HttpSource {
    fn open(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let url = self.url_for(name)?;
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| DemError::Network {
                resource: name.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DemError::Network {
                resource: name.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        Ok(Box::new(response))
    }

    fn describe(&self) -> String {
        self.base.to_string()
    }
}

/// Tile set mirrored in a local directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Create a source reading from `root`, which must be a directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(DemError::InvalidBaseUrl {
                url: root.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self { root })
    }
}

impl TileSource for DirectorySource {
    fn open(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let file = File::open(self.root.join(name)).map_err(|e| DemError::Network {
            resource: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(file))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Download counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchStats {
    /// Tiles downloaded and published by this fetcher.
    pub tiles_fetched: u64,
    /// Decompressed bytes written to the cache.
    pub bytes_written: u64,
}

/// Downloads the manifest and tiles of one tile set.
///
/// The fetcher itself does no locking. Callers serialize work on the
/// same tile (see [`crate::KeyedLock`]).
pub struct TileFetcher {
    source: Box<dyn TileSource>,
    tiles_fetched: AtomicU64,
    bytes_written: AtomicU64,
}

impl TileFetcher {
    pub fn new(source: Box<dyn TileSource>) -> Self {
        Self {
            source,
            tiles_fetched: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &dyn TileSource {
        self.source.as_ref()
    }

    /// Fetch `index.list.gz` and build the tile registry from it.
    ///
    /// Every member of a multi-member gzip file is read.
    pub fn load_registry(&self) -> Result<TileRegistry> {
        let stream = self.source.open(MANIFEST_NAME)?;
        let reader = BufReader::new(MultiGzDecoder::new(stream));
        TileRegistry::from_reader(reader).map_err(|e| match e {
            DemError::Io(io) => DemError::Network {
                resource: MANIFEST_NAME.to_string(),
                reason: format!("failed to read manifest: {}", io),
            },
            other => other,
        })
    }

    /// Make sure the tile is in the cache and return its local path.
    ///
    /// A tile that is already cached is returned after a single existence
    /// check, without touching the source.
    pub fn ensure_cached(&self, store: &TileCacheStore, identifier: &str) -> Result<PathBuf> {
        let path = store.path_for(identifier);
        if path.exists() {
            return Ok(path);
        }

        tracing::info!(base = %self.source.describe(), identifier, "downloading tile");
        let published = store.publish(identifier, |out| self.download(identifier, out, &path))?;
        if let Some(written) = published.bytes_written {
            self.tiles_fetched.fetch_add(1, Ordering::Relaxed);
            self.bytes_written.fetch_add(written, Ordering::Relaxed);
        }
        Ok(published.path)
    }

    /// Stream a decompressed tile into `out`.
    fn download(&self, identifier: &str, out: &mut dyn Write, dest: &Path) -> Result<u64> {
        let stream = self.source.open(identifier)?;
        let mut decoder = Compression::from_name(identifier).decoder(stream);
        copy_stream(&mut decoder, out, identifier, dest)
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            tiles_fetched: self.tiles_fetched.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Copy keeping read failures (network, corrupt data) apart from write
/// failures (local disk).
fn copy_stream(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    resource: &str,
    dest: &Path,
) -> Result<u64> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(DemError::Network {
                    resource: resource.to_string(),
                    reason: format!("failed to read or decompress: {}", e),
                })
            }
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| DemError::local_storage(dest, e))?;
        total += n as u64;
    }
}
