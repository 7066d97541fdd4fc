//! Bounded relay pump between an upstream body and the client response.
//!
//! A spawned task pulls upstream chunks into a small channel; the response
//! body drains that channel. The channel bound is the only buffering, so a
//! slow client stalls the upstream read instead of growing memory. When the
//! client goes away the response body (and with it the receiver) is dropped,
//! the pump notices the closed channel and drops the upstream stream, which
//! closes the upstream connection.

use std::fmt::Display;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use super::StreamingError;
use super::session::StreamSession;
use crate::config::StreamingConfig;

/// Which part of the upstream body reaches the client.
///
/// `skip` discards leading bytes, for an upstream that answered a ranged
/// request with the whole body. `limit` stops the relay after that many bytes
/// were forwarded; `None` relays until upstream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayWindow {
    pub skip: u64,
    pub limit: Option<u64>,
}

impl RelayWindow {
    pub fn full(content_length: Option<u64>) -> Self {
        Self {
            skip: 0,
            limit: content_length,
        }
    }

    pub fn exact(skip: u64, len: u64) -> Self {
        Self {
            skip,
            limit: Some(len),
        }
    }
}

/// Starts the pump and returns the client-facing body stream.
///
/// The session is owned by the pump from here on and receives exactly one
/// terminal event: `Completed`, `Aborted` on client disconnect, or `Failed`
/// when upstream errors, stalls longer than the idle timeout, or ends short
/// of the window. A failure after the first byte ends the body with an error
/// so the client connection is cut rather than finished cleanly.
pub fn spawn_relay<S, E>(
    upstream: S,
    window: RelayWindow,
    session: StreamSession,
    config: &StreamingConfig,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.relay_buffer_chunks.max(1));
    tokio::spawn(pump(
        upstream,
        window,
        session,
        tx,
        config.read_idle_timeout,
    ));

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}

async fn pump<S, E>(
    upstream: S,
    window: RelayWindow,
    mut session: StreamSession,
    tx: mpsc::Sender<io::Result<Bytes>>,
    idle_timeout: Duration,
) where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut upstream = Box::pin(upstream);
    let mut skip = window.skip;
    let mut remaining = window.limit;

    loop {
        if remaining == Some(0) {
            session.complete();
            return;
        }

        let next = tokio::select! {
            biased;
            _ = tx.closed() => {
                debug!("Client left stream {}, closing upstream", session.id());
                session.abort("client disconnected");
                return;
            }
            next = tokio::time::timeout(idle_timeout, upstream.next()) => next,
        };

        let mut chunk = match next {
            Err(_) => {
                let reason = format!("upstream idle for {idle_timeout:?}");
                return fail(session, &tx, reason).await;
            }
            Ok(None) => match remaining {
                Some(missing) => {
                    let reason = format!("upstream ended {missing} bytes early");
                    return fail(session, &tx, reason).await;
                }
                None => {
                    session.complete();
                    return;
                }
            },
            Ok(Some(Err(e))) => {
                let reason = format!("upstream read failed: {e}");
                return fail(session, &tx, reason).await;
            }
            Ok(Some(Ok(chunk))) => chunk,
        };

        if skip > 0 {
            let dropped = skip.min(chunk.len() as u64);
            chunk = chunk.slice(dropped as usize..);
            skip -= dropped;
        }
        if let Some(left) = remaining {
            if chunk.len() as u64 > left {
                chunk.truncate(left as usize);
            }
            remaining = Some(left - chunk.len() as u64);
        }
        if chunk.is_empty() {
            continue;
        }

        let len = chunk.len();
        if tx.send(Ok(chunk)).await.is_err() {
            session.abort("client disconnected");
            return;
        }
        session.record_bytes(len);
    }
}

async fn fail(session: StreamSession, tx: &mpsc::Sender<io::Result<Bytes>>, reason: String) {
    let error = StreamingError::InternalRelayFailure {
        reason: reason.clone(),
    };
    // Ignored when the client is already gone.
    let _ = tx.send(Err(io::Error::other(error))).await;
    session.fail(&reason);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::stream;

    use super::*;
    use crate::hooks::{MemoryEventSink, StreamEventKind};

    fn config(idle: Duration) -> StreamingConfig {
        StreamingConfig {
            read_idle_timeout: idle,
            relay_buffer_chunks: 2,
            ..StreamingConfig::default()
        }
    }

    fn chunks(parts: &[&'static [u8]]) -> Vec<Result<Bytes, String>> {
        parts.iter().map(|part| Ok(Bytes::from_static(part))).collect()
    }

    async fn collect(
        upstream: impl Stream<Item = Result<Bytes, String>> + Send + 'static,
        window: RelayWindow,
        sink: &Arc<MemoryEventSink>,
    ) -> (Vec<u8>, Option<io::Error>) {
        let session = StreamSession::new("tt1", "720p", sink.clone());
        let body = spawn_relay(upstream, window, session, &config(Duration::from_secs(5)));
        let mut body = Box::pin(body);

        let mut bytes = Vec::new();
        while let Some(item) = body.next().await {
            match item {
                Ok(chunk) => bytes.extend_from_slice(&chunk),
                Err(e) => return (bytes, Some(e)),
            }
        }
        (bytes, None)
    }

    #[tokio::test]
    async fn test_relays_everything_without_limit() {
        let sink = Arc::new(MemoryEventSink::new());
        let upstream = stream::iter(chunks(&[b"hello ", b"world"]));

        let (bytes, error) = collect(upstream, RelayWindow::full(None), &sink).await;
        assert_eq!(bytes, b"hello world");
        assert!(error.is_none());
        assert_eq!(sink.kinds(), vec![StreamEventKind::Completed]);
    }

    #[tokio::test]
    async fn test_skip_and_limit_trim_whole_body() {
        let sink = Arc::new(MemoryEventSink::new());
        let upstream = stream::iter(chunks(&[b"0123", b"4567", b"89"]));

        let (bytes, error) = collect(upstream, RelayWindow::exact(3, 4), &sink).await;
        assert_eq!(bytes, b"3456");
        assert!(error.is_none());
        assert_eq!(sink.kinds(), vec![StreamEventKind::Completed]);
    }

    #[tokio::test]
    async fn test_short_upstream_fails() {
        let sink = Arc::new(MemoryEventSink::new());
        let upstream = stream::iter(chunks(&[b"01234"]));

        let (bytes, error) = collect(upstream, RelayWindow::full(Some(10)), &sink).await;
        assert_eq!(bytes, b"01234");
        assert!(error.is_some());
        assert_eq!(sink.kinds(), vec![StreamEventKind::Failed]);
        assert!(sink.events()[0].detail.contains("5 bytes early"));
    }

    #[tokio::test]
    async fn test_upstream_error_cuts_body() {
        let sink = Arc::new(MemoryEventSink::new());
        let upstream = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err("connection reset".to_string()),
        ]);

        let (bytes, error) = collect(upstream, RelayWindow::full(None), &sink).await;
        assert_eq!(bytes, b"abc");
        assert!(error.is_some());
        assert_eq!(sink.kinds(), vec![StreamEventKind::Failed]);
    }

    #[tokio::test]
    async fn test_zero_length_window_completes_without_reading() {
        let sink = Arc::new(MemoryEventSink::new());
        let upstream = stream::pending::<Result<Bytes, String>>();

        let (bytes, error) = collect(upstream, RelayWindow::full(Some(0)), &sink).await;
        assert!(bytes.is_empty());
        assert!(error.is_none());
        assert_eq!(sink.kinds(), vec![StreamEventKind::Completed]);
    }

    #[tokio::test]
    async fn test_idle_upstream_fails() {
        let sink = Arc::new(MemoryEventSink::new());
        let session = StreamSession::new("tt1", "720p", sink.clone());
        let upstream = stream::iter(chunks(&[b"abc"])).chain(stream::pending());
        let body = spawn_relay(
            upstream,
            RelayWindow::full(None),
            session,
            &config(Duration::from_millis(50)),
        );
        let mut body = Box::pin(body);

        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        assert!(body.next().await.unwrap().is_err());
        assert!(body.next().await.is_none());
        assert_eq!(sink.kinds(), vec![StreamEventKind::Failed]);
    }

    #[tokio::test]
    async fn test_dropped_body_aborts() {
        let sink = Arc::new(MemoryEventSink::new());
        let session = StreamSession::new("tt1", "720p", sink.clone());
        let upstream = stream::iter(chunks(&[b"abc"])).chain(stream::pending());
        let body = spawn_relay(
            upstream,
            RelayWindow::full(None),
            session,
            &config(Duration::from_secs(30)),
        );
        let mut body = Box::pin(body);
        assert!(body.next().await.unwrap().is_ok());
        drop(body);

        for _ in 0..100 {
            if !sink.kinds().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.kinds(), vec![StreamEventKind::Aborted]);
    }
}
