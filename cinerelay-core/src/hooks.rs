//! Collaborator hooks consulted by the stream path.
//!
//! Authorization and event recording live outside the gateway; these traits
//! are the seams surrounding code plugs into.

use std::fmt;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Authorization check consulted once before a stream is resolved.
pub trait AccessPolicy: Send + Sync {
    /// Returns whether the request may stream or download `item_id`.
    fn is_authorized(&self, item_id: &str, headers: &HeaderMap) -> bool;
}

/// Policy that admits every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn is_authorized(&self, _item_id: &str, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Lifecycle milestones of one relayed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    /// Response headers are about to be sent
    Started,
    /// The size probe failed and the request degraded to a full relay
    ProbeFallback,
    /// The requested range lies outside the media
    RangeRejected,
    /// Every byte was relayed
    Completed,
    /// The client went away before the relay finished
    Aborted,
    /// Upstream failed; the response was cut or never started
    Failed,
}

impl StreamEventKind {
    /// Whether this kind ends a session.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamEventKind::RangeRejected
                | StreamEventKind::Completed
                | StreamEventKind::Aborted
                | StreamEventKind::Failed
        )
    }
}

impl fmt::Display for StreamEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamEventKind::Started => "started",
            StreamEventKind::ProbeFallback => "probe_fallback",
            StreamEventKind::RangeRejected => "range_rejected",
            StreamEventKind::Completed => "completed",
            StreamEventKind::Aborted => "aborted",
            StreamEventKind::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One stream lifecycle event.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    pub session_id: Uuid,
    pub item_id: String,
    pub quality: String,
    pub kind: StreamEventKind,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Fire-and-forget receiver of stream lifecycle events.
///
/// Called inline from request and relay tasks; implementations must not block.
pub trait StreamEventSink: Send + Sync {
    fn on_stream_event(&self, event: &StreamEvent);
}

/// Sink that writes every event to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl StreamEventSink for TracingEventSink {
    fn on_stream_event(&self, event: &StreamEvent) {
        match event.kind {
            StreamEventKind::Started | StreamEventKind::Completed => info!(
                "Stream {} [{} {}] {}: {}",
                event.session_id, event.item_id, event.quality, event.kind, event.detail
            ),
            StreamEventKind::ProbeFallback
            | StreamEventKind::RangeRejected
            | StreamEventKind::Aborted => warn!(
                "Stream {} [{} {}] {}: {}",
                event.session_id, event.item_id, event.quality, event.kind, event.detail
            ),
            StreamEventKind::Failed => error!(
                "Stream {} [{} {}] {}: {}",
                event.session_id, event.item_id, event.quality, event.kind, event.detail
            ),
        }
    }
}

/// Sink that keeps events in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far.
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    /// Kinds of all events recorded so far, in order.
    pub fn kinds(&self) -> Vec<StreamEventKind> {
        self.events.lock().iter().map(|event| event.kind).collect()
    }
}

impl StreamEventSink for MemoryEventSink {
    fn on_stream_event(&self, event: &StreamEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all_admits() {
        assert!(AllowAll.is_authorized("tt1", &HeaderMap::new()));
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(StreamEventKind::Completed.is_terminal());
        assert!(StreamEventKind::Aborted.is_terminal());
        assert!(StreamEventKind::Failed.is_terminal());
        assert!(StreamEventKind::RangeRejected.is_terminal());
        assert!(!StreamEventKind::Started.is_terminal());
        assert!(!StreamEventKind::ProbeFallback.is_terminal());
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemoryEventSink::new();
        for kind in [StreamEventKind::Started, StreamEventKind::Completed] {
            sink.on_stream_event(&StreamEvent {
                session_id: Uuid::new_v4(),
                item_id: "tt1".to_string(),
                quality: "720p".to_string(),
                kind,
                detail: String::new(),
                at: Utc::now(),
            });
        }
        assert_eq!(
            sink.kinds(),
            vec![StreamEventKind::Started, StreamEventKind::Completed]
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&StreamEventKind::ProbeFallback).unwrap();
        assert_eq!(json, "\"probe_fallback\"");
    }
}
