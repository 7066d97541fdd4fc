//! Partial-content relay through the gateway.

use std::time::Duration;

use cinerelay_core::StreamEventKind;

use crate::fake_upstream::{FakeUpstream, MediaFile, MediaMode, media_bytes};
use crate::harness::{Gateway, header, test_streaming_config};

async fn setup(mode: MediaMode, size: usize) -> (FakeUpstream, Gateway) {
    let upstream = FakeUpstream::start().await;
    upstream.add_media("movie-720", MediaFile::new(media_bytes(size), "video/mp4", mode));
    upstream.add_item("XYZ", &[("720p", "movie-720")]);
    let gateway = Gateway::start(&upstream).await;
    (upstream, gateway)
}

#[tokio::test]
async fn test_valid_range_relays_exact_slice() {
    let (upstream, gateway) = setup(MediaMode::Ranged, 1500).await;

    let response = gateway
        .fetch("/stream/XYZ?quality=720p", Some("bytes=100-199"))
        .await;

    assert_eq!(response.status(), 206);
    assert_eq!(header(&response, "content-range"), Some("bytes 100-199/1500"));
    assert_eq!(header(&response, "content-length"), Some("100"));
    assert_eq!(header(&response, "accept-ranges"), Some("bytes"));
    assert_eq!(header(&response, "content-type"), Some("video/mp4"));

    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], &media_bytes(1500)[100..200]);

    assert_eq!(
        gateway.settled_events().await,
        vec![StreamEventKind::Started, StreamEventKind::Completed]
    );
    assert_eq!(upstream.probe_calls(), 1);
    assert_eq!(upstream.media_fetches(), 1);
}

#[tokio::test]
async fn test_open_ended_range_runs_to_last_byte() {
    let (_upstream, gateway) = setup(MediaMode::Ranged, 1500).await;

    let response = gateway.fetch("/stream/XYZ", Some("bytes=1000-")).await;

    assert_eq!(response.status(), 206);
    assert_eq!(header(&response, "content-range"), Some("bytes 1000-1499/1500"));
    assert_eq!(header(&response, "content-length"), Some("500"));
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], &media_bytes(1500)[1000..]);
}

#[tokio::test]
async fn test_range_past_end_is_rejected_without_media_fetch() {
    let (upstream, gateway) = setup(MediaMode::Ranged, 1500).await;

    let response = gateway
        .fetch("/stream/XYZ?quality=720p", Some("bytes=1000-1999"))
        .await;

    assert_eq!(response.status(), 416);
    assert_eq!(header(&response, "content-range"), Some("bytes */1500"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "range_not_satisfiable");

    assert_eq!(upstream.probe_calls(), 1);
    assert_eq!(upstream.media_fetches(), 0);
    assert_eq!(
        gateway.settled_events().await,
        vec![StreamEventKind::RangeRejected]
    );
}

#[tokio::test]
async fn test_start_beyond_size_is_rejected() {
    let (upstream, gateway) = setup(MediaMode::Ranged, 1500).await;

    let response = gateway.fetch("/stream/XYZ", Some("bytes=1500-")).await;

    assert_eq!(response.status(), 416);
    assert_eq!(header(&response, "content-range"), Some("bytes */1500"));
    assert_eq!(upstream.media_fetches(), 0);
}

#[tokio::test]
async fn test_suffix_range_returns_tail() {
    let (_upstream, gateway) = setup(MediaMode::Ranged, 1500).await;

    let response = gateway.fetch("/stream/XYZ", Some("bytes=-10")).await;

    assert_eq!(response.status(), 206);
    assert_eq!(header(&response, "content-range"), Some("bytes 1490-1499/1500"));
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], &media_bytes(1500)[1490..]);
}

#[tokio::test]
async fn test_repeated_range_requests_are_identical() {
    let (_upstream, gateway) = setup(MediaMode::Ranged, 4096).await;

    let first = gateway
        .fetch("/stream/XYZ", Some("bytes=512-2047"))
        .await
        .bytes()
        .await
        .unwrap();
    let second = gateway
        .fetch("/stream/XYZ", Some("bytes=512-2047"))
        .await
        .bytes()
        .await
        .unwrap();

    assert_eq!(first.len(), 1536);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_upstream_ignoring_range_is_trimmed() {
    let (upstream, gateway) = setup(MediaMode::IgnoresRange, 2000).await;

    let response = gateway.fetch("/stream/XYZ", Some("bytes=300-1299")).await;

    assert_eq!(response.status(), 206);
    assert_eq!(header(&response, "content-range"), Some("bytes 300-1299/2000"));
    assert_eq!(header(&response, "content-length"), Some("1000"));
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], &media_bytes(2000)[300..1300]);
    assert_eq!(upstream.media_fetches(), 1);
}

#[tokio::test]
async fn test_malformed_range_is_ignored() {
    let (upstream, gateway) = setup(MediaMode::Ranged, 64).await;

    for range in ["bytes=abc-def", "bytes=0-1,4-5", "pages=1-2"] {
        let response = gateway.fetch("/stream/XYZ", Some(range)).await;
        assert_eq!(response.status(), 200, "{range}");
        assert_eq!(response.bytes().await.unwrap().len(), 64);
    }
    assert_eq!(upstream.probe_calls(), 0);
}

#[tokio::test]
async fn test_failed_probe_degrades_to_full_relay() {
    let (upstream, gateway) = setup(MediaMode::RejectsProbe, 300).await;

    let response = gateway.fetch("/stream/XYZ", Some("bytes=0-99")).await;

    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "content-length"), Some("300"));
    assert_eq!(response.bytes().await.unwrap().len(), 300);
    assert_eq!(upstream.probe_calls(), 1);
    assert_eq!(
        gateway.settled_events().await,
        vec![
            StreamEventKind::ProbeFallback,
            StreamEventKind::Started,
            StreamEventKind::Completed
        ]
    );
}

#[tokio::test]
async fn test_misaligned_upstream_range_is_server_error() {
    let (upstream, gateway) = setup(MediaMode::MisalignedRange, 1500).await;

    let response = gateway
        .fetch("/stream/XYZ?quality=720p", Some("bytes=1000-1009"))
        .await;

    assert_eq!(response.status(), 500);
    assert!(header(&response, "content-range").is_none());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "upstream_unavailable");
    assert_eq!(upstream.media_fetches(), 1);
    assert_eq!(gateway.settled_events().await, vec![StreamEventKind::Failed]);
}

#[tokio::test]
async fn test_slow_probe_degrades_to_full_relay() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media(
        "movie-720",
        MediaFile::new(media_bytes(300), "video/mp4", MediaMode::SlowProbe),
    );
    upstream.add_item("XYZ", &[("720p", "movie-720")]);

    let mut streaming = test_streaming_config();
    streaming.probe_timeout = Duration::from_millis(200);
    let gateway = Gateway::start_with(&upstream, streaming).await;

    let response = gateway.fetch("/stream/XYZ", Some("bytes=0-99")).await;

    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "content-length"), Some("300"));
    assert_eq!(&response.bytes().await.unwrap()[..], &media_bytes(300)[..]);
    assert_eq!(upstream.probe_calls(), 1);
    assert_eq!(
        gateway.settled_events().await,
        vec![
            StreamEventKind::ProbeFallback,
            StreamEventKind::Started,
            StreamEventKind::Completed
        ]
    );
}
