//! Cache statistics snapshot.

/// Statistics about cache performance.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Entries dropped to stay within the bound.
    pub evictions: u64,
    /// Current number of cached photos.
    pub size: usize,
}

impl CacheStats {
    /// Builds a snapshot, deriving the hit rate from the counters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(hits: u64, misses: u64, evictions: u64, size: usize) -> Self {
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            hits,
            misses,
            hit_rate,
            evictions,
            size,
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} photos, {:.1}% hit rate ({} hits, {} misses, {} evicted)",
            self.size, self.hit_rate, self.hits, self.misses, self.evictions
        )
    }
}
