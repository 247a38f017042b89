//! Striped per-key mutual exclusion.
//!
//! [`KeyedLock`] owns a fixed table of mutexes and maps every key onto one
//! of them by hash. Memory stays bounded no matter how many distinct keys
//! are seen. Two distinct keys may share a stripe, which only costs
//! throughput: operations on colliding keys are serialized, never run
//! concurrently on the same key.
//!
//! With `n` stripes and `k` keys in flight at once, the chance that a
//! given key waits on an unrelated one is about `1 - (1 - 1/n)^(k - 1)`,
//! i.e. roughly 1% for 1000 stripes and 10 concurrent fetches.
//!
//! Locks block (park) and have no timeout. A stuck guarded operation
//! stalls every caller whose key hashes to the same stripe.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

/// Default number of stripes.
pub const DEFAULT_STRIPES: usize = 1000;

/// A fixed-size table of locks addressed by key hash.
pub struct KeyedLock {
    stripes: Box<[Mutex<()>]>,
}

impl KeyedLock {
    /// Create a lock table with `stripes` entries (at least one).
    pub fn new(stripes: usize) -> Self {
        let stripes = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes }
    }

    /// Run `f` while holding the stripe for `key`.
    ///
    /// Not reentrant: calling `with_lock` for the same key (or a colliding
    /// one) from inside `f` deadlocks.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let _guard = self.stripes[self.stripe_index(key)].lock();
        f()
    }

    /// Index of the stripe guarding `key`.
    pub fn stripe_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Number of stripes in the table.
    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }
}

impl Default for KeyedLock {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}
