//! Local on-disk tile cache.
//!
//! Tiles are stored decompressed under their identifier with the
//! compression suffix stripped (`N00E134.tif.bz2` becomes `N00E134.tif`).
//!
//! # Atomic publish
//!
//! Data is always written to a uniquely named `<name>.<random>.download`
//! file next to the final path and moved into place only once it is
//! complete. On any failure the temporary file is removed and the final
//! path is never created, so a file present under its final name is
//! always complete. An existing final file is never overwritten, even when
//! another process publishes the same tile concurrently.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{DemError, Result};

/// Suffix of files that are still being written.
pub const PARTIAL_SUFFIX: &str = ".download";

/// Compression suffixes removed from identifiers to get local names.
const COMPRESSION_SUFFIXES: &[&str] = &[".bz2", ".gz"];

/// Result of [`TileCacheStore::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Final cache path of the tile.
    pub path: PathBuf,
    /// Bytes written by this call, or `None` when the tile was already
    /// present and the data written here (if any) was discarded.
    pub bytes_written: Option<u64>,
}

/// Directory of materialized tile files.
#[derive(Debug, Clone)]
pub struct TileCacheStore {
    dir: PathBuf,
}

impl TileCacheStore {
    /// Open (and create if needed) a cache directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| DemError::local_storage(&dir, e))?;
        Ok(Self { dir })
    }

    /// The default cache location, `<system temp>/dem`.
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("dem")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local file name for a tile identifier.
    ///
    /// Suffixes are matched case-insensitively, like
    /// [`Compression::from_name`](crate::fetch::Compression::from_name).
    pub fn local_name(identifier: &str) -> &str {
        COMPRESSION_SUFFIXES
            .iter()
            .find_map(|suffix| strip_suffix_ignore_case(identifier, suffix))
            .unwrap_or(identifier)
    }

    /// Final cache path for a tile identifier.
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.dir.join(Self::local_name(identifier))
    }

    /// Whether the tile is fully materialized. Only checks for existence.
    pub fn is_cached(&self, identifier: &str) -> bool {
        self.path_for(identifier).exists()
    }

    /// Write a tile through a temporary file and atomically move it into place.
    ///
    /// `write` receives a buffered writer for the temporary file and
    /// returns the number of bytes written. If the final path already
    /// exists, `write` is not called. If it appears while `write` runs,
    /// the existing file wins and the new data is dropped.
    ///
    /// # Errors
    ///
    /// Errors from `write` are returned as-is after the temporary file is
    /// deleted. Failing to create, flush or move the temporary file is a
    /// [`DemError::LocalStorage`] error.
    pub fn publish<F>(&self, identifier: &str, write: F) -> Result<Published>
    where
        F: FnOnce(&mut dyn Write) -> Result<u64>,
    {
        let final_path = self.path_for(identifier);
        if final_path.exists() {
            return Ok(Published {
                path: final_path,
                bytes_written: None,
            });
        }

        let parent = final_path.parent().unwrap_or(&self.dir);
        fs::create_dir_all(parent).map_err(|e| DemError::local_storage(parent, e))?;

        let mut partial = create_partial(parent, &final_path)?;
        let written = match write_and_sync(&mut partial, write) {
            Ok(written) => written,
            Err(e) => {
                remove_partial(partial);
                return Err(e);
            }
        };

        match partial.persist_noclobber(&final_path) {
            Ok(_) => Ok(Published {
                path: final_path,
                bytes_written: Some(written),
            }),
            Err(e) if final_path.exists() => {
                tracing::debug!(path = %final_path.display(), "tile published by another writer");
                remove_partial(e.file);
                Ok(Published {
                    path: final_path,
                    bytes_written: None,
                })
            }
            Err(e) => {
                remove_partial(e.file);
                Err(DemError::local_storage(&final_path, e.error))
            }
        }
    }

    /// List materialized tiles by local name, sorted.
    ///
    /// Temporary `.download` files are not included.
    pub fn cached_tiles(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| !name.ends_with(PARTIAL_SUFFIX))
            .collect();
        names.sort();
        names
    }

    /// Delete leftover `.download` files, e.g. after a crash.
    ///
    /// Only safe when no other process is downloading into the same
    /// directory. Returns the number of files removed.
    pub fn purge_partial(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.dir).map_err(|e| DemError::local_storage(&self.dir, e))?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_partial = path
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(PARTIAL_SUFFIX))
                .unwrap_or(false);
            if is_partial && path.is_file() {
                fs::remove_file(&path).map_err(|e| DemError::local_storage(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (stem, tail) = name.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(stem)
}

fn create_partial(dir: &Path, final_path: &Path) -> Result<NamedTempFile> {
    let prefix = final_path
        .file_name()
        .map(|name| format!("{}.", name.to_string_lossy()))
        .unwrap_or_default();
    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| DemError::local_storage(dir, e))
}

fn write_and_sync<F>(partial: &mut NamedTempFile, write: F) -> Result<u64>
where
    F: FnOnce(&mut dyn Write) -> Result<u64>,
{
    let path = partial.path().to_path_buf();
    let mut out = BufWriter::new(partial.as_file_mut());
    let written = write(&mut out)?;
    let file = out
        .into_inner()
        .map_err(|e| DemError::local_storage(&path, e.into_error()))?;
    file.sync_all()
        .map_err(|e| DemError::local_storage(&path, e))?;
    Ok(written)
}

fn remove_partial(partial: NamedTempFile) {
    let path = partial.path().to_path_buf();
    if let Err(e) = partial.close() {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "could not remove partial tile");
        }
    }
}
