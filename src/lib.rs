//! Cellar images - photo loading and caching for a wine collection client.
//!
//! Resolves remote label photo URLs to local object URLs, memoizes successful
//! loads in a bounded FIFO cache, and remembers failed URLs so they are never
//! refetched automatically.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "cellar-images";
