//! Range-aware stream proxy
//!
//! Turns a resolved `MediaSource` plus the client's `Range` header into a
//! streaming HTTP response. Partial requests are probed for the media size
//! and validated before any media bytes are requested; everything else, and
//! every probe failure, degrades to a plain full-body relay.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use reqwest::Client;
use tracing::{debug, info, warn};

use super::probe::{MediaProbe, parse_content_range_bounds, probe_media};
use super::range::{ByteRange, RangeSpec, parse_range_header};
use super::relay::{RelayWindow, spawn_relay};
use super::session::{RelayMode, StreamSession};
use super::{StreamingError, StreamingResult};
use crate::catalog::MediaSource;
use crate::config::StreamingConfig;
use crate::hooks::{StreamEventKind, StreamEventSink};

/// A resolved stream request.
#[derive(Debug, Clone)]
pub struct StreamTarget {
    pub item_id: String,
    /// Quality label the client asked for; the source may carry another
    pub requested_quality: String,
    pub source: MediaSource,
}

impl StreamTarget {
    pub fn new(
        item_id: impl Into<String>,
        requested_quality: impl Into<String>,
        source: MediaSource,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            requested_quality: requested_quality.into(),
            source,
        }
    }

    /// Attachment filename, `{item}_{quality}.{ext}` restricted to `[A-Za-z0-9._-]`.
    pub fn download_filename(&self) -> String {
        let raw = format!(
            "{}_{}.{}",
            self.item_id,
            self.source.quality,
            self.source.extension()
        );
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

/// Relays upstream media to clients, honoring single byte ranges.
///
/// Holds no per-request state; every call builds its own session and relay.
#[derive(Clone)]
pub struct StreamProxy {
    client: Client,
    config: StreamingConfig,
    events: Arc<dyn StreamEventSink>,
}

impl StreamProxy {
    pub fn new(client: Client, config: StreamingConfig, events: Arc<dyn StreamEventSink>) -> Self {
        Self {
            client,
            config,
            events,
        }
    }

    /// Builds the response for an inline stream request.
    ///
    /// Without a usable `Range` header, or when the media size cannot be
    /// learned, the whole body is relayed with `200`. A range that lies
    /// outside the media is rejected before any media bytes are fetched.
    ///
    /// # Errors
    ///
    /// - `StreamingError::RangeNotSatisfiable` - Range outside the probed media
    /// - `StreamingError::UpstreamTimeout` - Media fetch sent no headers in time
    /// - `StreamingError::UpstreamUnavailable` - Media fetch failed or answered an error status
    /// - `StreamingError::InternalRelayFailure` - Response headers could not be built
    pub async fn stream(
        &self,
        target: &StreamTarget,
        range_header: Option<&str>,
    ) -> StreamingResult<Response> {
        let session = self.session(target);

        let requested = match range_header.map(parse_range_header) {
            None => None,
            Some(Ok(range)) => Some(range),
            Some(Err(e)) => {
                warn!("Ignoring range header for {}: {}", target.item_id, e);
                None
            }
        };

        match requested {
            Some(range) => self.partial_or_fallback(target, session, range).await,
            None => self.full_relay(target, session, None).await,
        }
    }

    /// Builds the response for a download request.
    ///
    /// Downloads always relay the whole body and carry a
    /// `Content-Disposition: attachment` header.
    ///
    /// # Errors
    ///
    /// - `StreamingError::UpstreamTimeout` - Media fetch sent no headers in time
    /// - `StreamingError::UpstreamUnavailable` - Media fetch failed or answered an error status
    /// - `StreamingError::InternalRelayFailure` - Response headers could not be built
    pub async fn download(&self, target: &StreamTarget) -> StreamingResult<Response> {
        let session = self.session(target);
        let disposition = format!(
            "attachment; filename=\"{}\"",
            target.download_filename()
        );
        match HeaderValue::from_str(&disposition) {
            Ok(value) => self.full_relay(target, session, Some(value)).await,
            Err(e) => {
                let reason = format!("invalid download filename: {e}");
                session.fail(&reason);
                Err(StreamingError::InternalRelayFailure { reason })
            }
        }
    }

    fn session(&self, target: &StreamTarget) -> StreamSession {
        StreamSession::new(
            target.item_id.clone(),
            target.source.quality.clone(),
            Arc::clone(&self.events),
        )
    }

    async fn partial_or_fallback(
        &self,
        target: &StreamTarget,
        session: StreamSession,
        range: ByteRange,
    ) -> StreamingResult<Response> {
        let source = &target.source;
        let probe = match probe_media(&self.client, &source.url, self.config.probe_timeout).await {
            Ok(probe) => probe,
            Err(e) => {
                session.emit(StreamEventKind::ProbeFallback, e.to_string());
                return self.full_relay(target, session, None).await;
            }
        };

        let Some(total_size) = probe.total_size.or(source.declared_size) else {
            session.emit(
                StreamEventKind::ProbeFallback,
                "upstream disclosed no media size",
            );
            return self.full_relay(target, session, None).await;
        };

        let spec = match range.resolve(total_size) {
            Ok(spec) => spec,
            Err(_) => {
                session.reject_range(total_size);
                return Err(StreamingError::RangeNotSatisfiable { total_size });
            }
        };

        self.partial_relay(target, session, spec, total_size, probe)
            .await
    }

    async fn partial_relay(
        &self,
        target: &StreamTarget,
        session: StreamSession,
        spec: RangeSpec,
        total_size: u64,
        probe: MediaProbe,
    ) -> StreamingResult<Response> {
        let upstream = match self.fetch(&target.source.url, Some(spec)).await {
            Ok(response) => response,
            Err(e) => {
                session.fail(&e.to_string());
                return Err(e);
            }
        };

        let window = match upstream.status() {
            StatusCode::PARTIAL_CONTENT => {
                let answered = upstream
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_content_range_bounds);
                if answered != Some((spec.start, spec.end)) {
                    let reason = format!(
                        "media fetch answered range {:?} for requested {}-{}",
                        answered, spec.start, spec.end
                    );
                    session.fail(&reason);
                    return Err(StreamingError::UpstreamUnavailable { reason });
                }
                RelayWindow::exact(0, spec.len())
            }
            StatusCode::OK => {
                debug!(
                    "Upstream ignored range for {}, skipping {} bytes of full body",
                    target.item_id, spec.start
                );
                RelayWindow::exact(spec.start, spec.len())
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                session.fail("upstream rejected a range the probe allowed");
                return Err(StreamingError::RangeNotSatisfiable { total_size });
            }
            other => {
                let reason = format!("media fetch answered HTTP {other}");
                session.fail(&reason);
                return Err(StreamingError::UpstreamUnavailable { reason });
            }
        };

        let content_type = probe
            .content_type
            .or_else(|| upstream.headers().get(CONTENT_TYPE).cloned());

        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&spec.content_range(total_size)) {
            Ok(value) => headers.insert(CONTENT_RANGE, value),
            Err(e) => {
                let reason = format!("invalid content range: {e}");
                session.fail(&reason);
                return Err(StreamingError::InternalRelayFailure { reason });
            }
        };
        headers.insert(CONTENT_LENGTH, HeaderValue::from(spec.len()));
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, content_type);
        }

        session.emit(
            StreamEventKind::Started,
            format!(
                "{} relay of {} ({})",
                RelayMode::Partial,
                spec.content_range(total_size),
                target.source.quality
            ),
        );
        info!(
            "Relaying {} of {} for {}",
            spec.content_range(total_size),
            target.source.quality,
            target.item_id
        );

        let body = spawn_relay(upstream.bytes_stream(), window, session, &self.config);
        Ok(respond(StatusCode::PARTIAL_CONTENT, headers, Body::from_stream(body)))
    }

    async fn full_relay(
        &self,
        target: &StreamTarget,
        session: StreamSession,
        disposition: Option<HeaderValue>,
    ) -> StreamingResult<Response> {
        let upstream = match self.fetch(&target.source.url, None).await {
            Ok(response) => response,
            Err(e) => {
                session.fail(&e.to_string());
                return Err(e);
            }
        };

        let status = upstream.status();
        if !status.is_success() {
            let reason = format!("media fetch answered HTTP {status}");
            session.fail(&reason);
            return Err(StreamingError::UpstreamUnavailable { reason });
        }

        let mut headers = HeaderMap::new();
        for name in [CONTENT_LENGTH, CONTENT_TYPE, ACCEPT_RANGES] {
            if let Some(value) = upstream.headers().get(&name) {
                headers.insert(name, value.clone());
            }
        }
        if let Some(disposition) = disposition {
            headers.insert(CONTENT_DISPOSITION, disposition);
        }

        let content_length = upstream
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        session.emit(
            StreamEventKind::Started,
            format!(
                "{} relay of {} bytes ({})",
                RelayMode::Full,
                content_length.map_or_else(|| "unknown".to_string(), |len| len.to_string()),
                target.source.quality
            ),
        );
        info!(
            "Relaying full body of {} for {}",
            target.source.quality, target.item_id
        );

        let window = RelayWindow::full(content_length);
        let body = spawn_relay(upstream.bytes_stream(), window, session, &self.config);
        Ok(respond(StatusCode::OK, headers, Body::from_stream(body)))
    }

    /// Opens the media request; the fetch timeout bounds the wait for headers only.
    async fn fetch(&self, url: &str, range: Option<RangeSpec>) -> StreamingResult<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(spec) = range {
            request = request.header(RANGE, spec.request_header());
        }

        let timeout = self.config.fetch_timeout;
        tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| StreamingError::UpstreamTimeout {
                stage: "media fetch",
                timeout,
            })?
            .map_err(|e| StreamingError::UpstreamUnavailable {
                reason: format!("media fetch failed: {e}"),
            })
    }
}

impl std::fmt::Debug for StreamProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProxy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn respond(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::hooks::MemoryEventSink;

    fn target(item_id: &str, quality: &str, format: Option<&str>) -> StreamTarget {
        StreamTarget::new(
            item_id,
            quality,
            MediaSource {
                quality: quality.to_string(),
                url: "http://127.0.0.1:9/media".to_string(),
                declared_size: None,
                format: format.map(str::to_string),
            },
        )
    }

    fn proxy(sink: Arc<MemoryEventSink>) -> StreamProxy {
        let config = StreamingConfig {
            probe_timeout: Duration::from_millis(500),
            fetch_timeout: Duration::from_millis(500),
            ..StreamingConfig::default()
        };
        StreamProxy::new(Client::new(), config, sink)
    }

    #[test]
    fn test_download_filename() {
        assert_eq!(
            target("tt0111161", "1080p", Some("mkv")).download_filename(),
            "tt0111161_1080p.mkv"
        );
        assert_eq!(target("tt1", "720p", None).download_filename(), "tt1_720p.mp4");
    }

    #[test]
    fn test_download_filename_strips_unsafe_characters() {
        let name = target("a/b\"c", "7 20p", Some("mp4")).download_filename();
        assert_eq!(name, "a_b_c_7_20p.mp4");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_fails_full_relay() {
        let sink = Arc::new(MemoryEventSink::new());
        let result = proxy(sink.clone())
            .stream(&target("tt1", "720p", None), None)
            .await;

        assert!(matches!(
            result,
            Err(StreamingError::UpstreamUnavailable { .. } | StreamingError::UpstreamTimeout { .. })
        ));
        assert_eq!(sink.kinds(), vec![StreamEventKind::Failed]);
    }

    #[tokio::test]
    async fn test_failed_probe_falls_back_before_fetch() {
        let sink = Arc::new(MemoryEventSink::new());
        let result = proxy(sink.clone())
            .stream(&target("tt1", "720p", None), Some("bytes=0-99"))
            .await;

        assert!(result.is_err());
        assert_eq!(
            sink.kinds(),
            vec![StreamEventKind::ProbeFallback, StreamEventKind::Failed]
        );
    }
}
