//! Domain layer with photo entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheStats, FailureReason, ImageHandle, ImageId, LoadState};
pub use errors::{FetchError, LoaderError};
pub use ports::{ImageCachePort, ImageFetcherPort};
