//! HTTP request handlers organized by functionality

pub mod api;
pub mod error;
pub mod streaming;

// Re-export handler functions
pub use api::{SearchQuery, api_info, api_search, api_trending, health};
pub use error::ApiError;
pub use streaming::{QualityQuery, download_media, stream_media};
