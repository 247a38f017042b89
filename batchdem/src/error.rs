//! Error types for the batchdem library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving elevation values.
#[derive(Error, Debug)]
pub enum DemError {
    /// IO error that is not attributable to a specific cache file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tile manifest could not be used.
    #[error("Unusable tile manifest: {reason}")]
    ManifestFormat { reason: String },

    /// A remote resource could not be fetched or decoded.
    #[error("Failed to fetch {resource}: {reason}")]
    Network { resource: String, reason: String },

    /// HTTP client error.
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A cache file could not be written, renamed or created.
    #[error("Local storage error at {path}: {source}")]
    LocalStorage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tile file does not describe a single-band elevation raster.
    #[error("Invalid raster {path}: {reason}")]
    RasterFormat { path: PathBuf, reason: String },

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The coordinate matched the index but lies outside the tile's data.
    ///
    /// This means the manifest and the tile disagree and is never
    /// converted into a NaN result.
    #[error(
        "Point ({x}, {y}) is outside the tile data envelope ({min_x}, {min_y}) - ({max_x}, {max_y})"
    )]
    PointOutsideData {
        x: f64,
        y: f64,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },

    /// The base location of the tile set is not usable.
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// Reader configuration error.
    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl DemError {
    /// Whether repeating the same call may succeed.
    ///
    /// Failures are never cached, so a later lookup of the same tile
    /// starts the fetch from scratch.
    pub fn is_retryable(&self) -> bool {
        match self {
            DemError::Network { .. } | DemError::LocalStorage { .. } | DemError::Io(_) => true,
            #[cfg(feature = "http")]
            DemError::Http(_) => true,
            _ => false,
        }
    }

    pub(crate) fn local_storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DemError::LocalStorage {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using [`DemError`].
pub type Result<T> = std::result::Result<T, DemError>;
