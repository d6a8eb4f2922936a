//! HTTP adapter for downloading photos.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::domain::entities::{FetchedImage, ImageId};
use crate::domain::errors::{FetchError, LoaderError};
use crate::domain::ports::ImageFetcherPort;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("cellar-images/", env!("CARGO_PKG_VERSION"));

/// Downloads photos with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    /// Creates a fetcher with the given timeout and user agent.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, LoaderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(|e| LoaderError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }

    /// Creates a fetcher with default settings.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, LoaderError> {
        Self::new(DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT)
    }
}

#[async_trait]
impl ImageFetcherPort for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let id = ImageId::from_url(url);
        debug!(id = %id, "Downloading photo from network");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::body(e.to_string()))?;

        trace!(id = %id, size = bytes.len(), "Downloaded photo");

        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}
