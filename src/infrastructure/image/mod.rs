//! Photo handling infrastructure.
//!
//! This module provides:
//! - Object URL registry for fetched bytes
//! - Memory caching with FIFO eviction
//! - Negative caching of failed URLs
//! - HTTP fetching and content type detection
//! - Async photo loading service

pub mod content_type;
pub mod failed_urls;
pub mod http_fetcher;
pub mod loader;
pub mod memory_cache;
pub mod object_url;
#[cfg(test)]
mod test_server;

pub use content_type::{content_type_from_url, probe_dimensions, resolve_content_type};
pub use failed_urls::FailedUrlSet;
pub use http_fetcher::HttpImageFetcher;
pub use loader::{ImageLoader, ImageLoaderConfig, ImageRequest, LoaderStats};
pub use memory_cache::MemoryImageCache;
pub use object_url::ObjectUrlRegistry;
