//! Full-body relay and downloads.

use std::time::Duration;

use cinerelay_core::StreamEventKind;

use crate::fake_upstream::{FakeUpstream, MediaFile, MediaMode, media_bytes};
use crate::harness::{Gateway, header, test_streaming_config};

#[tokio::test]
async fn test_ten_byte_source_without_range() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media("tiny", MediaFile::ranged(media_bytes(10), "video/mp4"));
    upstream.add_item("tiny", &[("720p", "tiny")]);
    let gateway = Gateway::start(&upstream).await;

    let response = gateway.fetch("/stream/tiny?quality=720p", None).await;

    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "content-length"), Some("10"));
    assert_eq!(header(&response, "content-type"), Some("video/mp4"));
    assert!(header(&response, "content-range").is_none());
    assert_eq!(&response.bytes().await.unwrap()[..], &media_bytes(10)[..]);

    assert_eq!(upstream.probe_calls(), 0);
    assert_eq!(
        gateway.settled_events().await,
        vec![StreamEventKind::Started, StreamEventKind::Completed]
    );
}

#[tokio::test]
async fn test_missing_length_is_not_fabricated() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media(
        "chunked",
        MediaFile::new(media_bytes(37), "video/webm", MediaMode::NoLength),
    );
    upstream.add_item("chunked", &[("720p", "chunked")]);
    let gateway = Gateway::start(&upstream).await;

    let response = gateway.fetch("/stream/chunked", None).await;

    assert_eq!(response.status(), 200);
    assert!(header(&response, "content-length").is_none());
    assert_eq!(header(&response, "content-type"), Some("video/webm"));
    assert_eq!(&response.bytes().await.unwrap()[..], &media_bytes(37)[..]);
}

#[tokio::test]
async fn test_broken_media_is_server_error() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media("broken", MediaFile::new(Vec::new(), "video/mp4", MediaMode::Broken));
    upstream.add_item("broken", &[("720p", "broken")]);
    let gateway = Gateway::start(&upstream).await;

    let response = gateway.fetch("/stream/broken", None).await;

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "upstream_unavailable");
    assert!(body["message"].as_str().unwrap().contains("500"));
    assert_eq!(gateway.settled_events().await, vec![StreamEventKind::Failed]);
}

#[tokio::test]
async fn test_download_is_full_attachment() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media("dl", MediaFile::ranged(media_bytes(256), "video/mp4"));
    upstream.add_item("tt0111161", &[("1080p", "dl")]);
    let gateway = Gateway::start(&upstream).await;

    let response = gateway
        .fetch("/download/tt0111161?quality=1080p", Some("bytes=0-9"))
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        header(&response, "content-disposition"),
        Some("attachment; filename=\"tt0111161_1080p.mp4\"")
    );
    assert_eq!(header(&response, "content-length"), Some("256"));
    assert_eq!(response.bytes().await.unwrap().len(), 256);
    assert_eq!(upstream.probe_calls(), 0);
}

#[tokio::test]
async fn test_slow_media_headers_time_out() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media(
        "late",
        MediaFile::new(media_bytes(64), "video/mp4", MediaMode::SlowHeaders),
    );
    upstream.add_item("late", &[("720p", "late")]);

    let mut streaming = test_streaming_config();
    streaming.fetch_timeout = Duration::from_millis(200);
    let gateway = Gateway::start_with(&upstream, streaming).await;

    let response = gateway.fetch("/stream/late", None).await;

    assert_eq!(response.status(), 504);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "upstream_timeout");
    assert_eq!(upstream.media_fetches(), 1);
    assert_eq!(gateway.settled_events().await, vec![StreamEventKind::Failed]);
}
