//! Domain entities.

mod cache_stats;
mod image;

pub use cache_stats::CacheStats;
pub use image::{FailureReason, FetchedImage, ImageHandle, ImageId, LoadState, ObjectUrl};
