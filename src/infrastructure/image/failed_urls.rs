//! Negative cache of photo URLs whose fetch failed.
//!
//! Membership is terminal for the life of the set: nothing is retried until
//! the URL is explicitly forgotten.

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::debug;

use crate::domain::entities::ImageId;

/// Thread-safe set of failed URLs.
#[derive(Default)]
pub struct FailedUrlSet {
    urls: Mutex<HashSet<String>>,
}

impl FailedUrlSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `url` has failed before.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.urls.lock().contains(url)
    }

    /// Records a failure. Returns false if it was already recorded.
    pub fn insert(&self, url: &str) -> bool {
        let added = self.urls.lock().insert(url.to_string());
        if added {
            debug!(id = %ImageId::from_url(url), "Marked photo url as failed");
        }
        added
    }

    /// Forgets a failure so the URL can be fetched again.
    pub fn remove(&self, url: &str) -> bool {
        self.urls.lock().remove(url)
    }

    /// Number of failed URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.lock().len()
    }

    /// Returns true if nothing has failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every failure.
    pub fn clear(&self) {
        self.urls.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let failed = FailedUrlSet::new();
        assert!(failed.insert("a"));
        assert!(!failed.insert("a"));
        assert!(failed.contains("a"));
        assert_eq!(failed.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let failed = FailedUrlSet::new();
        failed.insert("a");
        failed.insert("b");

        assert!(failed.remove("a"));
        assert!(!failed.contains("a"));

        failed.clear();
        assert!(failed.is_empty());
    }
}
