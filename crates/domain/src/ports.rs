//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ComposedPost, ImageRequest, Lot, Parcel, Platform, StreetImage};

/// Error type for lot store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open lot store: {0}")]
    Open(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Lot not found: {0}")]
    NotFound(String),
    #[error("Lot {id} is already posted to {platform}")]
    AlreadyPosted { id: String, platform: Platform },
    #[error("Invalid post identifier '{0}'")]
    InvalidMarker(String),
}

/// Port for reading and advancing the durable lot table
#[async_trait]
pub trait LotStore: Send + Sync {
    /// Look up a single lot by id
    async fn get(&self, id: &str) -> Result<Option<Lot>, StoreError>;

    /// The lot with the greatest id that has been posted to `platform`
    async fn get_last_posted(&self, platform: Platform) -> Result<Option<Lot>, StoreError>;

    /// The lot with the smallest id strictly greater than `after` that has
    /// not been posted to `platform`. `None` means "before the first record".
    async fn get_next_unposted_after(
        &self,
        after: Option<&str>,
        platform: Platform,
    ) -> Result<Option<Lot>, StoreError>;

    /// Record the platform's post identifier for a lot, all-or-nothing
    async fn mark_posted(
        &self,
        id: &str,
        platform: Platform,
        post_id: &str,
    ) -> Result<(), StoreError>;
}

/// Port for populating the lot table during ingestion
#[async_trait]
pub trait LotWriter: Send + Sync {
    /// Insert lots whose id is not stored yet; returns how many were inserted
    async fn insert_if_absent(&self, lots: &[Lot]) -> Result<usize, StoreError>;

    /// Mark every unposted lot with `id <= pin` as seeded for `platform`
    async fn seed_posted_through(&self, pin: &str, platform: Platform)
    -> Result<u64, StoreError>;
}

/// Error type for image acquisition
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),
    #[error("No valid location available for lot {0}")]
    NoLocation(String),
    #[error("Image API error: {0}")]
    Api(String),
    #[error("Invalid image response: {0}")]
    InvalidImage(String),
}

/// Port for acquiring a street-level image of a location
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_image(&self, request: &ImageRequest) -> Result<StreetImage, ImageError>;
}

/// Error type for publisher operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Content too long: {len} > {max}")]
    ContentTooLong { len: usize, max: usize },
    #[error("Media upload failed: {0}")]
    Media(String),
}

/// Result of a successful publish operation
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// Platform-specific post ID, stored as the lot's marker
    pub id: String,
    /// URL to the published content, if available
    pub url: Option<String>,
}

/// Port for posting a composed lot to one platform
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish the post with its image, returns the platform's post ID
    async fn publish(
        &self,
        post: &ComposedPost,
        image: &StreetImage,
    ) -> Result<PublishResult, PublishError>;

    /// Get the platform this publisher posts to
    fn platform(&self) -> Platform;
}

/// Error type for parcel source operations
#[derive(Debug, Error)]
pub enum ParcelSourceError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Port for paging through parcels from a remote geographic service
#[async_trait]
pub trait ParcelSource: Send + Sync {
    async fn fetch_page(&self, offset: usize, limit: usize)
    -> Result<Vec<Parcel>, ParcelSourceError>;
}
