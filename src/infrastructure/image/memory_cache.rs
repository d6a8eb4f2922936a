//! In-memory FIFO photo cache.
//!
//! Entries are evicted strictly in insertion order. The underlying
//! [`LruCache`] is only ever read through `peek`, so lookups never promote an
//! entry and its recency order stays equal to insertion order.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CacheStats, ImageHandle, ImageId};
use crate::domain::ports::ImageCachePort;

use super::object_url::ObjectUrlRegistry;

/// Default maximum number of photos to keep in memory.
pub const DEFAULT_CACHE_SIZE: usize = 200;

/// Bounded photo cache keyed by source URL.
/// Releases the object URL of every entry it drops.
pub struct MemoryImageCache {
    cache: Mutex<LruCache<String, Arc<ImageHandle>>>,
    registry: Arc<ObjectUrlRegistry>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache with the specified capacity. Released handles are
    /// revoked in `registry`.
    #[must_use]
    pub fn new(capacity: usize, registry: Arc<ObjectUrlRegistry>) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
            registry,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn release(&self, handle: &ImageHandle) {
        self.registry.revoke(&handle.object_url);
    }
}

impl Drop for MemoryImageCache {
    fn drop(&mut self) {
        for (_, handle) in self.cache.get_mut().iter() {
            self.registry.revoke(&handle.object_url);
        }
    }
}

impl ImageCachePort for MemoryImageCache {
    fn get(&self, url: &str) -> Option<Arc<ImageHandle>> {
        let cache = self.cache.lock();
        if let Some(handle) = cache.peek(url) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(id = %ImageId::from_url(url), "Memory cache hit");
            Some(handle.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(id = %ImageId::from_url(url), "Memory cache miss");
            None
        }
    }

    fn peek(&self, url: &str) -> Option<Arc<ImageHandle>> {
        self.cache.lock().peek(url).cloned()
    }

    fn contains(&self, url: &str) -> bool {
        self.cache.lock().contains(url)
    }

    fn put(&self, url: &str, handle: Arc<ImageHandle>) -> Arc<ImageHandle> {
        let mut cache = self.cache.lock();
        let existing = cache.peek(url).cloned();

        if let Some(existing) = existing {
            drop(cache);
            if existing.object_url != handle.object_url {
                trace!(id = %ImageId::from_url(url), "Photo already cached, keeping existing entry");
                self.release(&handle);
            }
            return existing;
        }

        debug!(id = %ImageId::from_url(url), "Storing photo in memory cache");
        let evicted = cache.push(url.to_string(), handle.clone());
        drop(cache);

        if let Some((old_url, old_handle)) = evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(id = %ImageId::from_url(&old_url), "Evicted oldest photo from memory cache");
            self.release(&old_handle);
        }
        handle
    }

    fn evict(&self, url: &str) -> bool {
        let removed = self.cache.lock().pop(url);
        match removed {
            Some(handle) => {
                self.release(&handle);
                debug!(id = %ImageId::from_url(url), "Evicted photo from memory cache");
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.cache.lock().len()
    }

    fn clear(&self) {
        let drained: Vec<Arc<ImageHandle>> = {
            let mut cache = self.cache.lock();
            let mut drained = Vec::with_capacity(cache.len());
            while let Some((_, handle)) = cache.pop_lru() {
                drained.push(handle);
            }
            drained
        };
        for handle in &drained {
            self.release(handle);
        }
        debug!(count = drained.len(), "Cleared memory photo cache");
    }

    fn stats(&self) -> CacheStats {
        CacheStats::new(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
            self.len(),
        )
    }
}
