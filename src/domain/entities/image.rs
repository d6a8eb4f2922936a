//! Domain types for wine photo loading.

use std::sync::Arc;

use bytes::Bytes;

use crate::domain::errors::FetchError;

/// Short stable id of a photo URL, used in logs in place of the URL itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId([u8; 16]);

impl ImageId {
    /// Derives the id from the first 16 bytes of the URL's SHA-256 digest.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(url.as_bytes());
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest[..16]);
        Self(id)
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Local reference to fetched bytes, valid until revoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    /// Scheme prefix shared by every object URL.
    pub const SCHEME: &'static str = "blob:";

    /// Wraps an already formatted object URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Returns the URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw payload returned by a fetcher.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// Response body.
    pub bytes: Bytes,
    /// Content type reported by the server, if any.
    pub content_type: Option<String>,
}

impl FetchedImage {
    /// Creates a payload with no content type.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
        }
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A loaded photo. Immutable once created; shared between every caller of the same URL.
#[derive(Debug, PartialEq, Eq)]
pub struct ImageHandle {
    /// Local reference usable as an image source.
    pub object_url: ObjectUrl,
    /// The remote URL this was fetched from.
    pub source_url: String,
    /// Best known content type.
    pub content_type: Option<String>,
    /// Payload size in bytes.
    pub size: usize,
    /// Pixel dimensions, when the image header could be read.
    pub dimensions: Option<(u32, u32)>,
}

/// Why a request ended in the error state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No URL was supplied.
    MissingUrl,
    /// The URL failed earlier in this session and is not retried.
    PreviouslyFailed,
    /// The fetch itself failed.
    Fetch(FetchError),
    /// The loader has been shut down.
    ShutDown,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingUrl => write!(f, "no image url"),
            Self::PreviouslyFailed => write!(f, "previously failed"),
            Self::Fetch(e) => write!(f, "{e}"),
            Self::ShutDown => write!(f, "loader shut down"),
        }
    }
}

/// Observable state of a single photo request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Fetch in progress.
    Loading,
    /// Photo available.
    Loaded(Arc<ImageHandle>),
    /// Photo unavailable; callers show a fallback.
    Error(FailureReason),
}

impl LoadState {
    /// Returns true while the fetch is in progress.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Returns true if the photo is available.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// Returns true if the request ended in error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns true for `Loaded` and `Error`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !self.is_loading()
    }

    /// Returns the loaded handle, if any.
    #[must_use]
    pub const fn resource(&self) -> Option<&Arc<ImageHandle>> {
        match self {
            Self::Loaded(handle) => Some(handle),
            _ => None,
        }
    }

    /// Short lowercase name of the state.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Loaded(_) => "loaded",
            Self::Error(_) => "error",
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
