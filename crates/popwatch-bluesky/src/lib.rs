//! Bluesky publisher: session handling, blob upload, rich-text facets and
//! post creation over AT Protocol XRPC.

pub mod client;
pub mod error;
pub mod facets;
mod retry;
pub mod types;

pub use client::{BlueskyClient, DEFAULT_SERVICE_URL};
pub use error::BlueskyError;
pub use facets::detect_facets;
pub use retry::{DEFAULT_BACKOFF_BASE_MS, DEFAULT_MAX_ATTEMPTS};
