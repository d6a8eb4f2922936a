//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Photo handling (fetching, caching, object URLs).
pub mod image;

pub use config::{AppConfig, CacheConfig, CliArgs, LogLevel, StorageManager};
pub use image::{
    HttpImageFetcher, ImageLoader, ImageLoaderConfig, ImageRequest, LoaderStats, MemoryImageCache,
    ObjectUrlRegistry,
};
