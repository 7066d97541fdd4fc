//! Per-request stream session.
//!
//! A session is created when a stream request starts and is owned by exactly
//! one request: first by the proxy while it probes and fetches, then by the
//! relay pump. It emits exactly one terminal event.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::hooks::{StreamEvent, StreamEventKind, StreamEventSink};

/// How the response body is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// 200 with the whole upstream body
    Full,
    /// 206 with one validated byte range
    Partial,
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayMode::Full => write!(f, "full"),
            RelayMode::Partial => write!(f, "partial"),
        }
    }
}

/// Lifecycle tracker of one relayed stream.
pub struct StreamSession {
    id: Uuid,
    item_id: String,
    quality: String,
    sink: Arc<dyn StreamEventSink>,
    started_at: Instant,
    bytes_relayed: u64,
    finished: bool,
}

impl StreamSession {
    pub fn new(
        item_id: impl Into<String>,
        quality: impl Into<String>,
        sink: Arc<dyn StreamEventSink>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id: item_id.into(),
            quality: quality.into(),
            sink,
            started_at: Instant::now(),
            bytes_relayed: 0,
            finished: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn bytes_relayed(&self) -> u64 {
        self.bytes_relayed
    }

    /// Counts bytes handed to the client side of the relay.
    pub fn record_bytes(&mut self, count: usize) {
        self.bytes_relayed += count as u64;
    }

    /// Emits a non-terminal event.
    pub fn emit(&self, kind: StreamEventKind, detail: impl Into<String>) {
        debug_assert!(!kind.is_terminal(), "terminal events go through finish");
        self.send(kind, detail.into());
    }

    /// All bytes were relayed.
    pub fn complete(mut self) {
        let detail = format!(
            "{} bytes in {:.2?}",
            self.bytes_relayed,
            self.started_at.elapsed()
        );
        self.finish(StreamEventKind::Completed, detail);
    }

    /// The client disconnected before the relay finished.
    pub fn abort(mut self, reason: &str) {
        let detail = format!("{reason} after {} bytes", self.bytes_relayed);
        self.finish(StreamEventKind::Aborted, detail);
    }

    /// Upstream failed, before or during the relay.
    pub fn fail(mut self, reason: &str) {
        let detail = format!("{reason} after {} bytes", self.bytes_relayed);
        self.finish(StreamEventKind::Failed, detail);
    }

    /// The client range lies outside the media; no media fetch follows.
    pub fn reject_range(mut self, total_size: u64) {
        self.finish(
            StreamEventKind::RangeRejected,
            format!("media is {total_size} bytes"),
        );
    }

    fn finish(&mut self, kind: StreamEventKind, detail: String) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.send(kind, detail);
    }

    fn send(&self, kind: StreamEventKind, detail: String) {
        self.sink.on_stream_event(&StreamEvent {
            session_id: self.id,
            item_id: self.item_id.clone(),
            quality: self.quality.clone(),
            kind,
            detail,
            at: Utc::now(),
        });
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        // A session dropped without a verdict belonged to a cancelled task.
        let detail = format!("relay task dropped after {} bytes", self.bytes_relayed);
        self.finish(StreamEventKind::Aborted, detail);
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("item_id", &self.item_id)
            .field("quality", &self.quality)
            .field("bytes_relayed", &self.bytes_relayed)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::MemoryEventSink;

    fn session(sink: &Arc<MemoryEventSink>) -> StreamSession {
        StreamSession::new("tt42", "720p", sink.clone())
    }

    #[test]
    fn test_complete_emits_once() {
        let sink = Arc::new(MemoryEventSink::new());
        let mut s = session(&sink);
        s.emit(StreamEventKind::Started, "full relay");
        s.record_bytes(10);
        s.complete();

        assert_eq!(
            sink.kinds(),
            vec![StreamEventKind::Started, StreamEventKind::Completed]
        );
        assert!(sink.events()[1].detail.starts_with("10 bytes"));
    }

    #[test]
    fn test_drop_without_verdict_is_abort() {
        let sink = Arc::new(MemoryEventSink::new());
        drop(session(&sink));
        assert_eq!(sink.kinds(), vec![StreamEventKind::Aborted]);
    }

    #[test]
    fn test_events_share_session_id() {
        let sink = Arc::new(MemoryEventSink::new());
        let s = session(&sink);
        let id = s.id();
        s.emit(StreamEventKind::ProbeFallback, "probe timed out");
        s.fail("upstream closed");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.session_id == id && e.item_id == "tt42"));
        assert_eq!(events[1].kind, StreamEventKind::Failed);
    }

    #[test]
    fn test_reject_range_is_terminal() {
        let sink = Arc::new(MemoryEventSink::new());
        session(&sink).reject_range(1500);
        assert_eq!(sink.kinds(), vec![StreamEventKind::RangeRejected]);
        assert_eq!(sink.events()[0].detail, "media is 1500 bytes");
    }
}
