//! In-memory cache of opened tile handles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;

use crate::error::Result;

/// Opened tiles keyed by tile identifier.
///
/// The cache is unbounded: every tile touched during the reader's lifetime
/// stays open until [`TileHandleCache::clear`]. Callers serialize
/// `get_or_open` per identifier, so each tile is opened once.
pub struct TileHandleCache<H> {
    cache: Cache<String, Arc<H>>,
    hit_count: AtomicU64,
    open_count: AtomicU64,
}

impl<H: Send + Sync + 'static> TileHandleCache<H> {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().build(),
            hit_count: AtomicU64::new(0),
            open_count: AtomicU64::new(0),
        }
    }

    /// Cached handle for `identifier`, or the result of `open`.
    ///
    /// A failed `open` is not cached.
    pub fn get_or_open<F>(&self, identifier: &str, open: F) -> Result<Arc<H>>
    where
        F: FnOnce() -> Result<H>,
    {
        if let Some(handle) = self.get(identifier) {
            return Ok(handle);
        }

        let handle = Arc::new(open()?);
        self.open_count.fetch_add(1, Ordering::Relaxed);
        self.cache.insert(identifier.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Cached handle for `identifier`, counted as a hit when present.
    pub fn get(&self, identifier: &str) -> Option<Arc<H>> {
        let handle = self.cache.get(identifier)?;
        self.hit_count.fetch_add(1, Ordering::Relaxed);
        Some(handle)
    }

    /// Drop every cached handle.
    ///
    /// Handles still referenced by in-flight queries are released when
    /// those queries finish.
    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lookups served from the cache.
    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    /// Number of handles opened.
    pub fn open_count(&self) -> u64 {
        self.open_count.load(Ordering::Relaxed)
    }
}

impl<H: Send + Sync + 'static> Default for TileHandleCache<H> {
    fn default() -> Self {
        Self::new()
    }
}
