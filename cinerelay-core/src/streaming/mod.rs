//! Range-aware media relay.
//!
//! A request is served either as a partial-content relay (probe the upstream
//! size, validate the client range, fetch only that range) or as a full-body
//! relay. Bytes flow through a bounded relay pump so upstream is never read
//! faster than the client consumes, and a client disconnect tears down the
//! upstream connection.

pub mod probe;
pub mod proxy;
pub mod range;
pub mod relay;
pub mod session;

use std::time::Duration;

pub use probe::{MediaProbe, probe_media};
pub use proxy::{StreamProxy, StreamTarget};
pub use range::{ByteRange, RangeError, RangeSpec, parse_range_header};
pub use relay::{RelayWindow, spawn_relay};
pub use session::{RelayMode, StreamSession};

/// Errors of the stream path.
///
/// Every variant returned from `StreamProxy` occurs before the first response
/// byte. Failures after that point cannot change the status line and surface
/// only as a cut connection plus a `Failed` stream event.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    #[error("Upstream media unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    #[error("Upstream {stage} timed out after {timeout:?}")]
    UpstreamTimeout {
        stage: &'static str,
        timeout: Duration,
    },

    #[error("Range not satisfiable for {total_size} byte media")]
    RangeNotSatisfiable { total_size: u64 },

    #[error("Relay failed mid-stream: {reason}")]
    InternalRelayFailure { reason: String },
}

pub type StreamingResult<T> = Result<T, StreamingError>;
