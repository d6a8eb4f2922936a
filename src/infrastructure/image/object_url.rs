//! In-process object URL registry.
//!
//! Fetched photo bytes are parked here under a `blob:` URL. Holders of an
//! [`ObjectUrl`] can resolve it until it is revoked, after which the bytes are
//! freed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use crate::domain::entities::ObjectUrl;

const DEFAULT_ORIGIN: &str = "cellar";

/// Registry mapping live object URLs to their bytes.
pub struct ObjectUrlRegistry {
    origin: String,
    entries: Mutex<HashMap<ObjectUrl, Bytes>>,
    created: AtomicU64,
    revoked: AtomicU64,
}

impl ObjectUrlRegistry {
    /// Creates a registry whose URLs look like `blob:<origin>/<uuid>`.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            entries: Mutex::new(HashMap::new()),
            created: AtomicU64::new(0),
            revoked: AtomicU64::new(0),
        }
    }

    /// Registers bytes and returns a fresh object URL for them.
    pub fn create(&self, bytes: Bytes) -> ObjectUrl {
        let url = ObjectUrl::new(format!(
            "{}{}/{}",
            ObjectUrl::SCHEME,
            self.origin,
            uuid::Uuid::new_v4()
        ));
        trace!(url = %url, size = bytes.len(), "Created object url");
        self.entries.lock().insert(url.clone(), bytes);
        self.created.fetch_add(1, Ordering::Relaxed);
        url
    }

    /// Returns the bytes behind a live object URL.
    #[must_use]
    pub fn resolve(&self, url: &ObjectUrl) -> Option<Bytes> {
        self.entries.lock().get(url).cloned()
    }

    /// Releases an object URL. Returns false if it was not live.
    pub fn revoke(&self, url: &ObjectUrl) -> bool {
        let removed = self.entries.lock().remove(url).is_some();
        if removed {
            self.revoked.fetch_add(1, Ordering::Relaxed);
            trace!(url = %url, "Revoked object url");
        }
        removed
    }

    /// Returns true if the URL has not been revoked.
    #[must_use]
    pub fn is_live(&self, url: &ObjectUrl) -> bool {
        self.entries.lock().contains_key(url)
    }

    /// Number of live object URLs.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Total bytes held by live object URLs.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.entries.lock().values().map(Bytes::len).sum()
    }

    /// Number of URLs created over the registry's lifetime.
    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of URLs revoked over the registry's lifetime.
    #[must_use]
    pub fn revoked_count(&self) -> u64 {
        self.revoked.load(Ordering::Relaxed)
    }
}

impl Default for ObjectUrlRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ORIGIN)
    }
}

impl std::fmt::Debug for ObjectUrlRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectUrlRegistry")
            .field("origin", &self.origin)
            .field("live", &self.live_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_resolve() {
        let registry = ObjectUrlRegistry::default();
        let url = registry.create(Bytes::from_static(b"jpeg"));

        assert!(url.as_str().starts_with("blob:cellar/"));
        assert_eq!(registry.resolve(&url).as_deref(), Some(&b"jpeg"[..]));
        assert_eq!(registry.live_bytes(), 4);
    }

    #[test]
    fn test_urls_are_unique() {
        let registry = ObjectUrlRegistry::default();
        let a = registry.create(Bytes::from_static(b"x"));
        let b = registry.create(Bytes::from_static(b"x"));
        assert_ne!(a, b);
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_revoke_frees_bytes() {
        let registry = ObjectUrlRegistry::default();
        let url = registry.create(Bytes::from_static(b"png"));

        assert!(registry.revoke(&url));
        assert!(!registry.is_live(&url));
        assert!(registry.resolve(&url).is_none());
        assert!(!registry.revoke(&url));
        assert_eq!(registry.created_count(), 1);
        assert_eq!(registry.revoked_count(), 1);
    }
}
