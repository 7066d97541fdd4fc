//! In-process stand-in for the upstream catalog and media CDN.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// How a media URL behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMode {
    /// Honors single ranges with 206
    Ranged,
    /// Always answers 200 with the whole body
    IgnoresRange,
    /// 200 without `Content-Length`, chunked
    NoLength,
    /// Answers 500 to the one-byte probe, ranged otherwise
    RejectsProbe,
    /// Always 500
    Broken,
    /// Drips 1 KiB every 20ms and records when its body is dropped
    Slow { chunks: usize },
    /// Sends the first 100 bytes, then nothing, under the full length
    Stalls,
    /// Answers the one-byte probe correctly, but every other range with
    /// `206` for the same length counted from offset 0
    MisalignedRange,
    /// Holds the probe's headers back for `HEADER_DELAY`, ranged otherwise
    SlowProbe,
    /// Holds every response's headers back for `HEADER_DELAY`
    SlowHeaders,
    /// Ranged `206` over `chunks` KiB of `x`, dripped like `Slow`
    SlowRanged { chunks: usize },
}

/// Long enough to trip any timeout the tests configure.
pub const HEADER_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct MediaFile {
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub mode: MediaMode,
}

impl MediaFile {
    pub fn new(bytes: Vec<u8>, content_type: &'static str, mode: MediaMode) -> Self {
        Self {
            bytes: Bytes::from(bytes),
            content_type,
            mode,
        }
    }

    pub fn ranged(bytes: Vec<u8>, content_type: &'static str) -> Self {
        Self::new(bytes, content_type, MediaMode::Ranged)
    }
}

/// Deterministic media bytes, distinct per offset within a 251 byte cycle.
pub fn media_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[derive(Default)]
pub struct UpstreamState {
    items: Mutex<HashMap<String, Value>>,
    media: Mutex<HashMap<String, MediaFile>>,
    pub source_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
    pub media_fetches: AtomicUsize,
    pub metadata_calls: AtomicUsize,
    pub slow_body_dropped: AtomicBool,
}

pub struct FakeUpstream {
    pub base_url: String,
    pub state: Arc<UpstreamState>,
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let state = Arc::new(UpstreamState::default());
        let app = Router::new()
            .route("/api/sources/{id}", get(serve_sources))
            .route("/api/search/{query}", get(serve_search))
            .route("/api/info/{id}", get(serve_info))
            .route("/api/trending", get(serve_trending))
            .route("/media/{name}", get(serve_media))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base_url: format!("http://{address}"),
            state,
        }
    }

    pub fn media_url(&self, name: &str) -> String {
        format!("{}/media/{}", self.base_url, name)
    }

    pub fn add_media(&self, name: &str, file: MediaFile) {
        self.state.media.lock().insert(name.to_string(), file);
    }

    /// Lists `(quality, media name)` sources for an item, in the given order.
    pub fn add_item(&self, item_id: &str, sources: &[(&str, &str)]) {
        let results: Vec<Value> = sources
            .iter()
            .map(|(quality, media)| {
                json!({
                    "quality": quality,
                    "download_url": self.media_url(media),
                    "format": "mp4",
                })
            })
            .collect();
        self.add_listing(item_id, json!({"success": true, "results": results}));
    }

    pub fn add_listing(&self, item_id: &str, listing: Value) {
        self.state.items.lock().insert(item_id.to_string(), listing);
    }

    pub fn media_fetches(&self) -> usize {
        self.state.media_fetches.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.state.probe_calls.load(Ordering::SeqCst)
    }

    pub fn source_calls(&self) -> usize {
        self.state.source_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> usize {
        self.state.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn slow_body_dropped(&self) -> bool {
        self.state.slow_body_dropped.load(Ordering::SeqCst)
    }
}

async fn serve_sources(State(state): State<Arc<UpstreamState>>, Path(id): Path<String>) -> Response {
    state.source_calls.fetch_add(1, Ordering::SeqCst);
    if id == "catalog-down" {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let listing = state
        .items
        .lock()
        .get(&id)
        .cloned()
        .unwrap_or_else(|| json!({"success": false, "results": []}));
    Json(listing).into_response()
}

async fn serve_search(
    State(state): State<Arc<UpstreamState>>,
    Path(query): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.metadata_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "query": query,
        "page": params.get("page").cloned(),
        "results": [{"id": "tt0133093", "title": "The Matrix"}],
    }))
}

async fn serve_info(State(state): State<Arc<UpstreamState>>, Path(id): Path<String>) -> Response {
    state.metadata_calls.fetch_add(1, Ordering::SeqCst);
    if id == "missing" {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({"id": id, "title": format!("Movie {id}")})).into_response()
}

async fn serve_trending(State(state): State<Arc<UpstreamState>>) -> Json<Value> {
    state.metadata_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({"results": ["tt1", "tt2"]}))
}

async fn serve_media(
    State(state): State<Arc<UpstreamState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let range = headers
        .get(RANGE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let is_probe = range.as_deref() == Some("bytes=0-0");
    if is_probe {
        state.probe_calls.fetch_add(1, Ordering::SeqCst);
    } else {
        state.media_fetches.fetch_add(1, Ordering::SeqCst);
    }

    let Some(file) = state.media.lock().get(&name).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match file.mode {
        MediaMode::Broken => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        MediaMode::RejectsProbe if is_probe => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        MediaMode::Ranged | MediaMode::RejectsProbe => ranged_response(&file, range.as_deref()),
        MediaMode::IgnoresRange => full_response(&file),
        MediaMode::NoLength => {
            let chunks: Vec<io::Result<Bytes>> = file
                .bytes
                .chunks(4)
                .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
                .collect();
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, file.content_type)
                .body(Body::from_stream(stream::iter(chunks)))
                .unwrap()
        }
        MediaMode::Slow { chunks } => slow_response(state.clone(), chunks),
        MediaMode::MisalignedRange if is_probe => ranged_response(&file, range.as_deref()),
        MediaMode::MisalignedRange => misaligned_response(&file, range.as_deref()),
        MediaMode::SlowProbe => {
            if is_probe {
                tokio::time::sleep(HEADER_DELAY).await;
            }
            ranged_response(&file, range.as_deref())
        }
        MediaMode::SlowHeaders => {
            tokio::time::sleep(HEADER_DELAY).await;
            full_response(&file)
        }
        MediaMode::SlowRanged { chunks } => {
            slow_ranged_response(state.clone(), chunks as u64 * 1024, range.as_deref())
        }
        MediaMode::Stalls => {
            let head = file.bytes.slice(..100.min(file.bytes.len()));
            let body = stream::once(async move { Ok::<_, io::Error>(head) }).chain(stream::pending());
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, file.content_type)
                .header(CONTENT_LENGTH, file.bytes.len())
                .body(Body::from_stream(body))
                .unwrap()
        }
    }
}

fn full_response(file: &MediaFile) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, file.content_type)
        .header(CONTENT_LENGTH, file.bytes.len())
        .header(ACCEPT_RANGES, "bytes")
        .body(Body::from(file.bytes.clone()))
        .unwrap()
}

fn ranged_response(file: &MediaFile, range: Option<&str>) -> Response {
    let Some((start, end)) = range.and_then(parse_simple_range) else {
        return full_response(file);
    };

    let len = file.bytes.len() as u64;
    if start >= len {
        return Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(CONTENT_RANGE, format!("bytes */{len}"))
            .body(Body::empty())
            .unwrap();
    }
    let end = end.unwrap_or(len - 1).min(len - 1);
    let slice = file.bytes.slice(start as usize..=end as usize);

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(CONTENT_TYPE, file.content_type)
        .header(CONTENT_RANGE, format!("bytes {start}-{end}/{len}"))
        .header(CONTENT_LENGTH, slice.len())
        .header(ACCEPT_RANGES, "bytes")
        .body(Body::from(slice))
        .unwrap()
}

/// Same length as requested, always starting at byte 0.
fn misaligned_response(file: &MediaFile, range: Option<&str>) -> Response {
    let Some((start, end)) = range.and_then(parse_simple_range) else {
        return full_response(file);
    };
    let total = file.bytes.len() as u64;
    let len = end.unwrap_or(total - 1).min(total - 1) - start + 1;
    let slice = file.bytes.slice(..len as usize);

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(CONTENT_TYPE, file.content_type)
        .header(CONTENT_RANGE, format!("bytes 0-{}/{total}", len - 1))
        .header(CONTENT_LENGTH, slice.len())
        .header(ACCEPT_RANGES, "bytes")
        .body(Body::from(slice))
        .unwrap()
}

fn parse_simple_range(value: &str) -> Option<(u64, Option<u64>)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some((start, end))
}

/// Marks the slow body as dropped once hyper lets go of it.
struct DropFlag(Arc<UpstreamState>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.slow_body_dropped.store(true, Ordering::SeqCst);
    }
}

/// Drips `len` bytes of `x` in 1 KiB chunks, flagging when the body is dropped.
fn slow_body(state: Arc<UpstreamState>, len: u64) -> Body {
    let flag = DropFlag(state);
    let body = stream::unfold((0u64, flag), move |(sent, flag)| async move {
        if sent >= len {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        let size = (len - sent).min(1024);
        let chunk = Bytes::from(vec![b'x'; size as usize]);
        Some((Ok::<_, io::Error>(chunk), (sent + size, flag)))
    });
    Body::from_stream(body)
}

fn slow_response(state: Arc<UpstreamState>, chunks: usize) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "video/mp4")
        .header(CONTENT_LENGTH, chunks * 1024)
        .body(slow_body(state, chunks as u64 * 1024))
        .unwrap()
}

/// The probe gets its one byte at once; other ranges drip.
fn slow_ranged_response(state: Arc<UpstreamState>, total: u64, range: Option<&str>) -> Response {
    let (start, end) = match range.and_then(parse_simple_range) {
        Some((start, end)) => (start, end.unwrap_or(total - 1).min(total - 1)),
        None => (0, total - 1),
    };
    let len = end - start + 1;
    let body = if start == 0 && end == 0 {
        Body::from(Bytes::from_static(b"x"))
    } else {
        slow_body(state, len)
    };

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(CONTENT_TYPE, "video/mp4")
        .header(CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))
        .header(CONTENT_LENGTH, len)
        .header(ACCEPT_RANGES, "bytes")
        .body(body)
        .unwrap()
}
