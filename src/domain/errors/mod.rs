//! Domain error types.

mod fetch_error;
mod loader_error;

pub use fetch_error::FetchError;
pub use loader_error::LoaderError;
