//! Cinerelay Core - Source resolution and range-aware stream proxying
//!
//! This crate provides the building blocks of the gateway: upstream catalog
//! access, selection of a concrete media source, HTTP byte-range handling and
//! the relay that pipes upstream media bytes to the browser.

pub mod catalog;
pub mod config;
pub mod hooks;
pub mod http;
pub mod streaming;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use catalog::{Catalog, CatalogError, HttpCatalog, MediaSource, SourceResolver};
pub use config::GatewayConfig;
pub use hooks::{AccessPolicy, AllowAll, StreamEvent, StreamEventKind, StreamEventSink};
pub use streaming::{RangeSpec, StreamProxy, StreamTarget, StreamingError};

/// Core errors that can bubble up from any Cinerelay subsystem.
#[derive(Debug, thiserror::Error)]
pub enum CinerelayError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("HTTP client error: {reason}")]
    Http { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CinerelayError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            CinerelayError::Catalog(e) => match e {
                CatalogError::ItemNotFound { item_id } => format!("Item {item_id} not found"),
                CatalogError::QualityUnavailable { item_id, quality } => {
                    format!("No playable {quality} source for item {item_id}")
                }
                CatalogError::InvalidItemId { reason } => format!("Invalid item id: {reason}"),
                CatalogError::UpstreamUnavailable { .. } => {
                    "Movie catalog is unavailable".to_string()
                }
            },
            CinerelayError::Streaming(StreamingError::RangeNotSatisfiable { total_size }) => {
                format!("Requested range is outside the {total_size} byte media")
            }
            CinerelayError::Streaming(_) => "Streaming error occurred".to_string(),
            CinerelayError::Configuration { reason } => format!("Configuration error: {reason}"),
            CinerelayError::Http { .. } => "HTTP client could not be created".to_string(),
            CinerelayError::Io(_) => "I/O error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CinerelayError::Configuration { .. }
                | CinerelayError::Catalog(CatalogError::InvalidItemId { .. })
                | CinerelayError::Streaming(StreamingError::RangeNotSatisfiable { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, CinerelayError>;
