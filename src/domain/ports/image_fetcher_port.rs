//! Port definition for fetching remote photos.

use async_trait::async_trait;

use crate::domain::entities::FetchedImage;
use crate::domain::errors::FetchError;

/// Port for downloading photo bytes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageFetcherPort: Send + Sync {
    /// Downloads the payload at `url`. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError>;
}
