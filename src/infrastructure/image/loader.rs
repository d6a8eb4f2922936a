//! Async photo loading orchestrator.
//!
//! Resolves remote photo URLs to object URLs: memory cache first, then the
//! negative cache of failed URLs, then the network. Cache and negative-cache
//! answers are produced synchronously; only network loads go through a
//! spawned task whose progress callers observe through an [`ImageRequest`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{
    CacheStats, FailureReason, FetchedImage, ImageHandle, ImageId, LoadState,
};
use crate::domain::errors::{FetchError, LoaderError};
use crate::domain::ports::{ImageCachePort, ImageFetcherPort};

use super::content_type::{probe_dimensions, resolve_content_type};
use super::failed_urls::FailedUrlSet;
use super::http_fetcher::HttpImageFetcher;
use super::memory_cache::{DEFAULT_CACHE_SIZE, MemoryImageCache};
use super::object_url::ObjectUrlRegistry;

/// Configuration for the photo loader.
#[derive(Debug, Clone)]
pub struct ImageLoaderConfig {
    /// Maximum photos in memory cache. Ignored when a cache is supplied to
    /// [`ImageLoader::with_cache`].
    pub max_entries: usize,
    /// Maximum concurrent downloads.
    pub max_concurrent_downloads: usize,
    /// Share one in-flight fetch between concurrent requests for a URL.
    pub coalesce_requests: bool,
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_SIZE,
            max_concurrent_downloads: 4,
            coalesce_requests: true,
        }
    }
}

/// Snapshot of loader counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoaderStats {
    /// Memory cache counters.
    pub cache: CacheStats,
    /// Requests answered from the failed-URL set.
    pub negative_hits: u64,
    /// URLs currently marked as failed.
    pub failed: usize,
    /// Network loads currently in flight.
    pub in_flight: usize,
    /// Object URLs not yet revoked.
    pub live_object_urls: usize,
    /// Bytes held by live object URLs.
    pub live_bytes: usize,
    /// Object URLs created since the loader started.
    pub object_urls_created: u64,
    /// Object URLs revoked since the loader started.
    pub object_urls_revoked: u64,
}

impl std::fmt::Display for LoaderStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}; {} failed urls ({} negative hits); {} in flight; \
             {} object urls ({} bytes, {} created, {} revoked)",
            self.cache,
            self.failed,
            self.negative_hits,
            self.in_flight,
            self.live_object_urls,
            self.live_bytes,
            self.object_urls_created,
            self.object_urls_revoked
        )
    }
}

/// Photo loader service. Cheap to clone; clones share caches.
#[derive(Clone)]
pub struct ImageLoader {
    inner: Arc<LoaderInner>,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

struct LoaderInner {
    config: ImageLoaderConfig,
    cache: Arc<dyn ImageCachePort>,
    failed: FailedUrlSet,
    registry: Arc<ObjectUrlRegistry>,
    fetcher: Arc<dyn ImageFetcherPort>,
    pending: Mutex<PendingLoads>,
    downloads: Arc<Semaphore>,
    runtime: Handle,
    negative_hits: AtomicU64,
    shut_down: AtomicBool,
}

#[derive(Default)]
struct PendingLoads {
    loads: HashMap<u64, PendingLoad>,
    by_url: HashMap<String, u64>,
    next_id: u64,
}

struct PendingLoad {
    url: String,
    state_tx: watch::Sender<LoadState>,
    subscribers: usize,
    task: AbortHandle,
}

impl PendingLoads {
    fn remove(&mut self, id: u64) -> Option<PendingLoad> {
        let load = self.loads.remove(&id)?;
        if self.by_url.get(&load.url) == Some(&id) {
            self.by_url.remove(&load.url);
        }
        Some(load)
    }
}

impl ImageLoader {
    /// Creates a loader that fetches through `fetcher` and keeps up to
    /// `config.max_entries` photos in memory.
    ///
    /// # Errors
    /// Returns error if called outside a tokio runtime.
    pub fn new(
        config: ImageLoaderConfig,
        fetcher: Arc<dyn ImageFetcherPort>,
    ) -> Result<Self, LoaderError> {
        let registry = Arc::new(ObjectUrlRegistry::default());
        let cache = Arc::new(MemoryImageCache::new(config.max_entries, registry.clone()));
        Self::with_cache(config, fetcher, cache, registry)
    }

    /// Creates a loader around an existing cache. `registry` must be the one
    /// the cache revokes released handles in.
    ///
    /// # Errors
    /// Returns error if called outside a tokio runtime.
    pub fn with_cache(
        config: ImageLoaderConfig,
        fetcher: Arc<dyn ImageFetcherPort>,
        cache: Arc<dyn ImageCachePort>,
        registry: Arc<ObjectUrlRegistry>,
    ) -> Result<Self, LoaderError> {
        let runtime = Handle::try_current()?;
        let downloads = Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1)));

        debug!(
            max_entries = config.max_entries,
            max_concurrent_downloads = config.max_concurrent_downloads,
            coalesce = config.coalesce_requests,
            "Photo loader started"
        );

        Ok(Self {
            inner: Arc::new(LoaderInner {
                config,
                cache,
                failed: FailedUrlSet::new(),
                registry,
                fetcher,
                pending: Mutex::new(PendingLoads::default()),
                downloads,
                runtime,
                negative_hits: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Creates a loader with default configuration and an HTTP fetcher.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created or no runtime is running.
    pub fn with_defaults() -> Result<Self, LoaderError> {
        let fetcher = HttpImageFetcher::with_defaults()?;
        Self::new(ImageLoaderConfig::default(), Arc::new(fetcher))
    }

    /// Requests a photo.
    ///
    /// Missing URLs, known-bad URLs and cached URLs are answered before this
    /// returns; anything else starts (or joins) a network load. A URL that is
    /// empty or only whitespace counts as missing; any other URL is used as
    /// given, without normalisation.
    #[must_use = "dropping the request cancels the load"]
    pub fn request(&self, url: Option<&str>) -> ImageRequest {
        match url.filter(|url| !url.trim().is_empty()) {
            Some(url) => self.inner.request(url),
            None => {
                trace!("No photo url, resolving to error");
                ImageRequest::ready(String::new(), LoadState::Error(FailureReason::MissingUrl))
            }
        }
    }

    /// Starts loading photos without waiting for them.
    pub fn prefetch<I, S>(&self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            self.request(Some(url.as_ref())).detach();
        }
    }

    /// Returns the cached handle for `url` without touching statistics.
    #[must_use]
    pub fn peek(&self, url: &str) -> Option<Arc<ImageHandle>> {
        self.inner.cache.peek(url)
    }

    /// Returns true if `url` is in the memory cache.
    #[must_use]
    pub fn is_cached(&self, url: &str) -> bool {
        self.inner.cache.contains(url)
    }

    /// Returns true if `url` failed earlier and will not be refetched.
    #[must_use]
    pub fn is_failed(&self, url: &str) -> bool {
        self.inner.failed.contains(url)
    }

    /// Returns true if a network load for `url` is in flight.
    #[must_use]
    pub fn is_loading(&self, url: &str) -> bool {
        let pending = self.inner.pending.lock();
        pending.loads.values().any(|load| load.url == url)
    }

    /// Returns the number of network loads in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().loads.len()
    }

    /// Returns the bytes behind a handle, or `None` once it has been released.
    #[must_use]
    pub fn resolve(&self, handle: &ImageHandle) -> Option<Bytes> {
        self.inner.registry.resolve(&handle.object_url)
    }

    /// Registry backing the handles this loader hands out.
    #[must_use]
    pub fn registry(&self) -> &Arc<ObjectUrlRegistry> {
        &self.inner.registry
    }

    /// Forgets everything known about `url` so the next request refetches it.
    /// Returns true if there was anything to forget.
    pub fn invalidate(&self, url: &str) -> bool {
        let _pending = self.inner.pending.lock();
        let evicted = self.inner.cache.evict(url);
        let unfailed = self.inner.failed.remove(url);
        if evicted || unfailed {
            debug!(id = %ImageId::from_url(url), "Invalidated photo url");
        }
        evicted || unfailed
    }

    /// Returns loader statistics.
    #[must_use]
    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            cache: self.inner.cache.stats(),
            negative_hits: self.inner.negative_hits.load(Ordering::Relaxed),
            failed: self.inner.failed.len(),
            in_flight: self.pending_count(),
            live_object_urls: self.inner.registry.live_count(),
            live_bytes: self.inner.registry.live_bytes(),
            object_urls_created: self.inner.registry.created_count(),
            object_urls_revoked: self.inner.registry.revoked_count(),
        }
    }

    /// Tears the loader down: aborts in-flight loads, releases every cached
    /// photo and forgets failures. Later requests resolve to an error.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let aborted: Vec<PendingLoad> = {
            let mut pending = self.inner.pending.lock();
            pending.by_url.clear();
            pending.loads.drain().map(|(_, load)| load).collect()
        };
        for load in &aborted {
            load.task.abort();
        }

        self.inner.downloads.close();
        self.inner.cache.clear();
        self.inner.failed.clear();

        info!(aborted = aborted.len(), "Photo loader shut down");
    }
}

impl LoaderInner {
    fn request(self: &Arc<Self>, url: &str) -> ImageRequest {
        let id = ImageId::from_url(url);
        let mut guard = self.pending.lock();
        let pending = &mut *guard;

        if self.shut_down.load(Ordering::Acquire) {
            return ImageRequest::ready(url.to_string(), LoadState::Error(FailureReason::ShutDown));
        }

        if self.failed.contains(url) {
            self.negative_hits.fetch_add(1, Ordering::Relaxed);
            trace!(id = %id, "Photo url failed before, not retrying");
            return ImageRequest::ready(
                url.to_string(),
                LoadState::Error(FailureReason::PreviouslyFailed),
            );
        }

        if let Some(handle) = self.cache.get(url) {
            return ImageRequest::ready(url.to_string(), LoadState::Loaded(handle));
        }

        if self.config.coalesce_requests
            && let Some(&load_id) = pending.by_url.get(url)
            && let Some(load) = pending.loads.get_mut(&load_id)
        {
            load.subscribers += 1;
            trace!(id = %id, subscribers = load.subscribers, "Joining in-flight photo load");
            return ImageRequest::pending(url.to_string(), load.state_tx.subscribe(), self, load_id);
        }

        let load_id = pending.next_id;
        pending.next_id += 1;

        let (state_tx, state_rx) = watch::channel(LoadState::Loading);
        let task = self
            .runtime
            .spawn(Self::run_load(Arc::clone(self), load_id, url.to_string()));

        pending.loads.insert(
            load_id,
            PendingLoad {
                url: url.to_string(),
                state_tx,
                subscribers: 1,
                task: task.abort_handle(),
            },
        );
        pending.by_url.insert(url.to_string(), load_id);
        drop(guard);

        debug!(id = %id, load_id, "Queued photo download");
        ImageRequest::pending(url.to_string(), state_rx, self, load_id)
    }

    async fn run_load(self: Arc<Self>, load_id: u64, url: String) {
        let result = match self.downloads.clone().acquire_owned().await {
            Ok(_permit) => self.fetcher.fetch(&url).await,
            // Closed by shutdown.
            Err(_) => return,
        };
        self.complete(load_id, &url, result);
    }

    fn complete(&self, load_id: u64, url: &str, result: Result<FetchedImage, FetchError>) {
        let id = ImageId::from_url(url);
        let outcome = result.map(|fetched| self.materialize(url, fetched));

        let mut pending = self.pending.lock();
        let Some(load) = pending.remove(load_id) else {
            if let Ok(handle) = &outcome {
                self.registry.revoke(&handle.object_url);
            }
            debug!(id = %id, load_id, "Discarding result of cancelled photo load");
            return;
        };

        let state = match outcome {
            Ok(handle) => {
                // A duplicate load that finished first keeps its entry.
                let cached = self.cache.put(url, handle);
                debug!(id = %id, size = cached.size, "Photo loaded");
                LoadState::Loaded(cached)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Photo load failed");
                // A duplicate load may already have cached a good copy.
                if !self.cache.contains(url) {
                    self.failed.insert(url);
                }
                LoadState::Error(FailureReason::Fetch(e))
            }
        };
        drop(pending);

        load.state_tx.send_replace(state);
    }

    fn materialize(&self, url: &str, fetched: FetchedImage) -> Arc<ImageHandle> {
        let content_type =
            resolve_content_type(fetched.content_type.as_deref(), &fetched.bytes, url);
        let dimensions = probe_dimensions(&fetched.bytes);
        let size = fetched.bytes.len();
        let object_url = self.registry.create(fetched.bytes);

        Arc::new(ImageHandle {
            object_url,
            source_url: url.to_string(),
            content_type,
            size,
            dimensions,
        })
    }

    fn release_subscriber(&self, load_id: u64) {
        let mut pending = self.pending.lock();
        let Some(load) = pending.loads.get_mut(&load_id) else {
            return;
        };
        load.subscribers = load.subscribers.saturating_sub(1);
        if load.subscribers > 0 {
            return;
        }
        if let Some(load) = pending.remove(load_id) {
            load.task.abort();
            debug!(id = %ImageId::from_url(&load.url), load_id, "Cancelled photo load");
        }
    }
}

struct Ticket {
    loader: Weak<LoaderInner>,
    load_id: u64,
}

/// One caller's view of a photo load.
///
/// Dropping an unsettled request cancels it; if it was the last caller
/// interested in that load, the download is aborted and nothing is recorded
/// for the URL.
pub struct ImageRequest {
    url: String,
    state_rx: watch::Receiver<LoadState>,
    ticket: Option<Ticket>,
}

impl ImageRequest {
    fn ready(url: String, state: LoadState) -> Self {
        let (_, state_rx) = watch::channel(state);
        Self {
            url,
            state_rx,
            ticket: None,
        }
    }

    fn pending(
        url: String,
        state_rx: watch::Receiver<LoadState>,
        loader: &Arc<LoaderInner>,
        load_id: u64,
    ) -> Self {
        Self {
            url,
            state_rx,
            ticket: Some(Ticket {
                loader: Arc::downgrade(loader),
                load_id,
            }),
        }
    }

    /// The requested URL (empty when none was given).
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state_rx.borrow().clone()
    }

    /// Returns true once the state is `Loaded` or `Error`.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state_rx.borrow().is_terminal()
    }

    /// Waits for a terminal state.
    ///
    /// Returns `None` if the load was abandoned because the loader shut down.
    pub async fn settled(&mut self) -> Option<LoadState> {
        let state = self
            .state_rx
            .wait_for(LoadState::is_terminal)
            .await
            .map(|state| (*state).clone())
            .ok();
        if state.is_some() {
            self.ticket = None;
        }
        state
    }

    /// Abandons the request.
    pub fn cancel(mut self) {
        self.release();
    }

    /// Lets the load run to completion without this request.
    pub fn detach(mut self) {
        self.ticket = None;
    }

    fn release(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        if self.state_rx.borrow().is_terminal() {
            return;
        }
        if let Some(loader) = ticket.loader.upgrade() {
            loader.release_subscriber(ticket.load_id);
        }
    }
}

impl Drop for ImageRequest {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ImageRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRequest")
            .field("url", &self.url)
            .field("state", &self.state_rx.borrow().name())
            .field("attached", &self.ticket.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use test_case::test_case;

    use crate::domain::ports::mocks::{GatedFetcher, MockImageFetcherPort};
    use crate::infrastructure::image::test_server::{CannedResponse, TestServer};

    fn loader_with(fetcher: Arc<dyn ImageFetcherPort>, config: ImageLoaderConfig) -> ImageLoader {
        ImageLoader::new(config, fetcher).unwrap()
    }

    fn gated(config: ImageLoaderConfig) -> (ImageLoader, Arc<GatedFetcher>) {
        let fetcher = Arc::new(GatedFetcher::new());
        (loader_with(fetcher.clone(), config), fetcher)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn let_tasks_run() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test_case(None ; "null_url")]
    #[test_case(Some("") ; "empty_url")]
    #[test_case(Some("   ") ; "blank_url")]
    #[tokio::test]
    async fn test_missing_url_errors_synchronously(url: Option<&str>) {
        let (loader, fetcher) = gated(ImageLoaderConfig::default());

        let request = loader.request(url);

        assert_eq!(request.state(), LoadState::Error(FailureReason::MissingUrl));
        assert!(request.is_settled());
        drop(request);
        let_tasks_run().await;
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_success_is_cached() {
        let mut mock = MockImageFetcherPort::new();
        mock.expect_fetch()
            .times(1)
            .returning(|_| Ok(FetchedImage::new(&b"label"[..]).with_content_type("image/jpeg")));
        let loader = loader_with(Arc::new(mock), ImageLoaderConfig::default());

        let mut first = loader.request(Some("https://x.app/b.jpg"));
        assert!(first.state().is_loading());
        let first = first.settled().await.unwrap();
        let first_handle = first.resource().unwrap().clone();

        let second = loader.request(Some("https://x.app/b.jpg"));
        let second = second.state();

        assert!(second.is_loaded());
        assert!(Arc::ptr_eq(second.resource().unwrap(), &first_handle));
        assert_eq!(loader.resolve(&first_handle).as_deref(), Some(&b"label"[..]));
        assert_eq!(first_handle.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(loader.stats().cache.hits, 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let mut mock = MockImageFetcherPort::new();
        mock.expect_fetch()
            .times(1)
            .returning(|_| Err(FetchError::status(404, "Not Found")));
        let loader = loader_with(Arc::new(mock), ImageLoaderConfig::default());

        let state = loader.request(Some("a")).settled().await.unwrap();
        assert_eq!(
            state,
            LoadState::Error(FailureReason::Fetch(FetchError::status(404, "Not Found")))
        );

        let again = loader.request(Some("a"));
        assert_eq!(again.state(), LoadState::Error(FailureReason::PreviouslyFailed));
        assert!(loader.is_failed("a"));
        assert!(!loader.is_cached("a"));
        assert_eq!(loader.stats().negative_hits, 1);
    }

    #[tokio::test]
    async fn test_oldest_entry_is_evicted_and_released() {
        let (loader, fetcher) = gated(ImageLoaderConfig {
            max_entries: 2,
            ..ImageLoaderConfig::default()
        });
        for url in ["a", "b", "c"] {
            fetcher.succeed(url, b"img");
        }

        let a = loader.request(Some("a")).settled().await.unwrap();
        loader.request(Some("b")).settled().await.unwrap();
        loader.request(Some("c")).settled().await.unwrap();

        assert!(!loader.is_cached("a"));
        assert!(loader.is_cached("b"));
        assert!(loader.is_cached("c"));
        assert!(loader.resolve(a.resource().unwrap()).is_none());
        assert_eq!(loader.registry().live_count(), 2);

        let mut again = loader.request(Some("a"));
        assert!(again.state().is_loading());
        assert!(again.settled().await.unwrap().is_loaded());
        assert_eq!(fetcher.calls("a"), 2);
        assert!(!loader.is_cached("b"));
    }

    #[test_case(true ; "successful_fetch")]
    #[test_case(false ; "failing_fetch")]
    #[tokio::test]
    async fn test_cancel_leaves_no_trace(succeeds: bool) {
        let (loader, fetcher) = gated(ImageLoaderConfig::default());
        if succeeds {
            fetcher.succeed("c", b"img");
        } else {
            fetcher.fail("c", FetchError::transport("reset"));
        }
        fetcher.hold("c");

        let request = loader.request(Some("c"));
        wait_until(|| fetcher.calls("c") == 1).await;
        assert!(loader.is_loading("c"));

        request.cancel();
        fetcher.release();
        let_tasks_run().await;

        assert!(!loader.is_cached("c"));
        assert!(!loader.is_failed("c"));
        assert_eq!(loader.pending_count(), 0);
        assert_eq!(loader.registry().live_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_cancels_before_fetch_starts() {
        let (loader, fetcher) = gated(ImageLoaderConfig::default());
        fetcher.succeed("c", b"img");

        drop(loader.request(Some("c")));
        let_tasks_run().await;

        assert_eq!(fetcher.calls("c"), 0);
        assert!(!loader.is_cached("c"));
        assert_eq!(loader.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let (loader, fetcher) = gated(ImageLoaderConfig::default());
        fetcher.succeed("d", b"img");
        fetcher.hold("d");

        let mut first = loader.request(Some("d"));
        let mut second = loader.request(Some("d"));
        wait_until(|| fetcher.calls("d") == 1).await;
        fetcher.release();

        let first = first.settled().await.unwrap();
        let second = second.settled().await.unwrap();

        assert_eq!(fetcher.calls("d"), 1);
        assert!(Arc::ptr_eq(
            first.resource().unwrap(),
            second.resource().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_cancelling_one_subscriber_keeps_the_load() {
        let (loader, fetcher) = gated(ImageLoaderConfig::default());
        fetcher.succeed("d", b"img");
        fetcher.hold("d");

        let first = loader.request(Some("d"));
        let mut second = loader.request(Some("d"));
        first.cancel();
        fetcher.release();

        assert!(second.settled().await.unwrap().is_loaded());
        assert!(loader.is_cached("d"));
    }

    #[tokio::test]
    async fn test_without_coalescing_first_insert_is_shared() {
        let (loader, fetcher) = gated(ImageLoaderConfig {
            coalesce_requests: false,
            ..ImageLoaderConfig::default()
        });
        fetcher.succeed("e", b"img");
        fetcher.hold("e");

        let mut first = loader.request(Some("e"));
        let mut second = loader.request(Some("e"));
        wait_until(|| fetcher.calls("e") == 2).await;
        fetcher.release();

        let first = first.settled().await.unwrap();
        let second = second.settled().await.unwrap();

        let first = first.resource().unwrap();
        let second = second.resource().unwrap();
        assert!(Arc::ptr_eq(first, second));
        assert!(Arc::ptr_eq(&loader.peek("e").unwrap(), first));
        assert_eq!(loader.resolve(first).as_deref(), Some(&b"img"[..]));
        assert_eq!(loader.resolve(second).as_deref(), Some(&b"img"[..]));
        assert_eq!(loader.stats().cache.size, 1);
        assert_eq!(loader.registry().live_count(), 1);
        assert_eq!(loader.stats().object_urls_created, 2);
        assert_eq!(loader.stats().object_urls_revoked, 1);
    }

    #[tokio::test]
    async fn test_padded_url_is_used_as_given() {
        let (loader, fetcher) = gated(ImageLoaderConfig::default());
        let padded = " https://x.app/c.jpg ";
        fetcher.succeed(padded, b"img");

        let state = loader.request(Some(padded)).settled().await.unwrap();

        assert!(state.is_loaded());
        assert_eq!(fetcher.calls(padded), 1);
        assert!(loader.is_cached(padded));
        assert!(!loader.is_cached("https://x.app/c.jpg"));
    }

    #[tokio::test]
    async fn test_with_cache_uses_supplied_cache() {
        let registry = Arc::new(ObjectUrlRegistry::default());
        let cache = Arc::new(MemoryImageCache::new(1, registry.clone()));
        let fetcher = Arc::new(GatedFetcher::new());
        fetcher.succeed("f", b"one");
        fetcher.succeed("g", b"two");
        let loader = ImageLoader::with_cache(
            ImageLoaderConfig::default(),
            fetcher.clone(),
            cache.clone(),
            registry.clone(),
        )
        .unwrap();

        let f = loader.request(Some("f")).settled().await.unwrap();
        let _ = loader.request(Some("g")).settled().await.unwrap();

        assert!(!cache.contains("f"));
        assert!(cache.contains("g"));
        assert!(loader.resolve(f.resource().unwrap()).is_none());
        assert_eq!(loader.stats().cache.evictions, 1);
        assert_eq!(registry.live_count(), 1);
    }

    #[tokio::test]
    async fn test_download_concurrency_is_bounded() {
        let (loader, fetcher) = gated(ImageLoaderConfig {
            max_concurrent_downloads: 1,
            ..ImageLoaderConfig::default()
        });
        fetcher.succeed("x", b"x");
        fetcher.succeed("y", b"y");
        fetcher.hold("x");

        let mut x = loader.request(Some("x"));
        let mut y = loader.request(Some("y"));
        wait_until(|| fetcher.calls("x") == 1).await;
        let_tasks_run().await;
        assert_eq!(fetcher.calls("y"), 0);

        fetcher.release();
        assert!(x.settled().await.unwrap().is_loaded());
        assert!(y.settled().await.unwrap().is_loaded());
    }

    #[tokio::test]
    async fn test_invalidate_allows_retry() {
        let (loader, fetcher) = gated(ImageLoaderConfig::default());

        let failed = loader.request(Some("f")).settled().await.unwrap();
        assert!(failed.is_error());
        assert!(loader.is_failed("f"));

        fetcher.succeed("f", b"img");
        assert!(loader.invalidate("f"));
        assert!(!loader.invalidate("f"));

        let retried = loader.request(Some("f")).settled().await.unwrap();
        assert!(retried.is_loaded());
        assert_eq!(fetcher.calls("f"), 2);

        assert!(loader.invalidate("f"));
        assert!(loader.resolve(retried.resource().unwrap()).is_none());
    }

    #[tokio::test]
    async fn test_prefetch_fills_cache() {
        let (loader, fetcher) = gated(ImageLoaderConfig::default());
        fetcher.succeed("p1", b"1");
        fetcher.succeed("p2", b"2");

        loader.prefetch(["p1", "p2", "p3"]);
        wait_until(|| loader.pending_count() == 0).await;

        assert!(loader.is_cached("p1"));
        assert!(loader.is_cached("p2"));
        assert!(loader.is_failed("p3"));
        assert_eq!(fetcher.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let (loader, fetcher) = gated(ImageLoaderConfig::default());
        fetcher.succeed("s1", b"img");
        fetcher.succeed("s2", b"img");
        fetcher.hold("s2");

        loader.request(Some("s1")).settled().await.unwrap();
        loader.request(Some("missing")).settled().await.unwrap();
        let mut in_flight = loader.request(Some("s2"));
        wait_until(|| fetcher.calls("s2") == 1).await;

        loader.shutdown();

        assert_eq!(in_flight.settled().await, None);
        assert_eq!(loader.stats().cache.size, 0);
        assert_eq!(loader.stats().failed, 0);
        assert_eq!(loader.registry().live_count(), 0);
        assert_eq!(
            loader.request(Some("s1")).state(),
            LoadState::Error(FailureReason::ShutDown)
        );
    }

    #[tokio::test]
    async fn test_http_scenarios() -> Result<(), Box<dyn std::error::Error>> {
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(6, 4).write_to(&mut png, image::ImageFormat::Png)?;
        let png = png.into_inner();

        let server = TestServer::start(vec![(
            "/scans/b.png",
            CannedResponse::ok("application/octet-stream", png.clone()),
        )])
        .await?;
        let loader = ImageLoader::with_defaults()?;

        let not_found = server.url("/scans/a.jpg");
        assert!(loader.request(Some(not_found.as_str())).settled().await.unwrap().is_error());
        assert!(loader.request(Some(not_found.as_str())).state().is_error());
        assert_eq!(server.hits("/scans/a.jpg"), 1);

        let found = server.url("/scans/b.png");
        let loaded = loader.request(Some(found.as_str())).settled().await.unwrap();
        let handle = loaded.resource().unwrap();
        assert_eq!(handle.content_type.as_deref(), Some("image/png"));
        assert_eq!(handle.dimensions, Some((6, 4)));
        assert_eq!(handle.size, png.len());
        assert_eq!(loader.resolve(handle).as_deref(), Some(png.as_slice()));

        let again = loader.request(Some(found.as_str())).state();
        assert!(Arc::ptr_eq(again.resource().unwrap(), handle));
        assert_eq!(server.hits("/scans/b.png"), 1);

        loader.shutdown();
        Ok(())
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = ImageLoader::new(
            ImageLoaderConfig::default(),
            Arc::new(GatedFetcher::new()),
        );
        assert!(matches!(result, Err(LoaderError::NoRuntime(_))));
    }
}
