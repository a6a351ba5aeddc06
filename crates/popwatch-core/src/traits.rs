//! Seams between the check cycle and its collaborators.
//!
//! The binary wires the storefront client, image store and Bluesky client in
//! here; tests substitute in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::item::ItemRecord;
use crate::post::{PostDraft, PreparedImage};

/// Why a listing page could not be fetched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network failure or non-success status; worth retrying.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// The storefront refused the request (HTTP 403).
    #[error("blocked by storefront: {0}")]
    Blocked(String),

    /// The response could not be interpreted as a listing page.
    #[error("malformed listing page: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("publisher is not authenticated")]
    NotAuthenticated,

    #[error("post rejected: {0}")]
    Rejected(String),

    #[error("post failed after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },
}

/// Produces item records for one listing page.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// # Errors
    ///
    /// Returns [`FetchError`] once the page cannot be fetched or parsed.
    async fn fetch(&self, page: &str) -> Result<Vec<ItemRecord>, FetchError>;
}

/// Downloads and stores the images attached to a post.
#[async_trait]
pub trait ImagePreparer: Send + Sync {
    /// Prepares every image of `item` that can be downloaded. Failures are
    /// skipped, so an empty result means no usable image.
    async fn prepare(&self, item: &ItemRecord) -> Vec<PreparedImage>;

    /// Alt text for the item's main image.
    fn alt_text(&self, item: &ItemRecord) -> String;

    /// Deletes stored images older than `max_age`, returning how many went.
    async fn cleanup(&self, max_age: Duration) -> usize;
}

/// Sends a finished post to the social network.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// # Errors
    ///
    /// Returns [`PublishError`] when the post could not be created.
    async fn publish(&self, draft: &PostDraft) -> Result<(), PublishError>;
}
