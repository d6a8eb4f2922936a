//! Loader construction error types.

use thiserror::Error;

/// Errors raised while building an image loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The loader spawns fetch tasks and must be created inside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// The HTTP client could not be built.
    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),
}
