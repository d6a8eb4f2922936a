//! Port definition for photo caching.

use std::sync::Arc;

use crate::domain::entities::{CacheStats, ImageHandle};

/// Port for bounded photo caches keyed by source URL.
/// Implementations must be thread-safe and must not block on I/O, since
/// cache hits are answered synchronously.
pub trait ImageCachePort: Send + Sync {
    /// Looks up a handle, recording a hit or miss.
    fn get(&self, url: &str) -> Option<Arc<ImageHandle>>;

    /// Looks up a handle without recording statistics.
    fn peek(&self, url: &str) -> Option<Arc<ImageHandle>>;

    /// Returns true if `url` is cached. Does not record statistics.
    fn contains(&self, url: &str) -> bool {
        self.peek(url).is_some()
    }

    /// Stores a handle under `url` unless one is already cached there.
    /// Returns the handle that ends up cached; a rejected `handle` is released.
    /// Entries pushed out by the bound are released.
    fn put(&self, url: &str, handle: Arc<ImageHandle>) -> Arc<ImageHandle>;

    /// Removes and releases a handle. Returns true if it was present.
    fn evict(&self, url: &str) -> bool;

    /// Returns the current number of cached photos.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and releases every handle.
    fn clear(&self);

    /// Returns cache statistics.
    fn stats(&self) -> CacheStats;
}
