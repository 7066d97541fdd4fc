//! Upstream movie catalog access and media source selection.
//!
//! The catalog answers "which renditions exist for this item"; the resolver
//! turns that answer into one concrete `MediaSource` for the stream proxy.

pub mod client;
pub mod resolver;
pub mod types;

use async_trait::async_trait;

pub use client::HttpCatalog;
pub use resolver::{SourceResolver, select_source};
pub use types::{MediaSource, SourceEntry, SourceListing};

/// Errors raised while looking up and selecting a media source.
///
/// All of these occur before any response byte is written, so they always map
/// onto an accurate HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid item id: {reason}")]
    InvalidItemId { reason: String },

    #[error("Item {item_id} not found upstream")]
    ItemNotFound { item_id: String },

    #[error("No playable source for item {item_id} (requested {quality})")]
    QualityUnavailable { item_id: String, quality: String },

    #[error("Upstream catalog unavailable: {reason}")]
    UpstreamUnavailable { reason: String },
}

/// Source listing backend.
///
/// Implementations query the upstream "sources" endpoint for one item. The
/// listing is returned verbatim; interpretation belongs to `SourceResolver`.
#[async_trait]
pub trait Catalog: Send + Sync + std::fmt::Debug {
    /// Fetches the download source listing for `item_id`.
    ///
    /// # Errors
    ///
    /// - `CatalogError::UpstreamUnavailable` - Request failed, timed out, or returned an unusable body
    async fn sources(&self, item_id: &str) -> Result<SourceListing, CatalogError>;
}
