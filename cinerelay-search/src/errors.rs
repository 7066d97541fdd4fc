//! Error types for metadata lookups.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while forwarding a metadata request.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The client supplied an empty or unusable query or id.
    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("Network error: {reason}")]
    NetworkError { reason: String },

    #[error("Upstream did not answer within {timeout:?}")]
    Timeout { timeout: Duration },

    /// Upstream answered with a non-success status.
    #[error("Upstream answered HTTP {status}")]
    UpstreamStatus { status: u16 },

    #[error("Parse error: {reason}")]
    ParseError { reason: String },
}

impl MetadataError {
    /// Whether the failure lies with the caller rather than upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(self, MetadataError::InvalidQuery { .. })
    }
}
