//! Source selection as observed through `/stream`.

use serde_json::json;

use crate::fake_upstream::{FakeUpstream, MediaFile, media_bytes};
use crate::harness::{Gateway, header};

#[tokio::test]
async fn test_missing_quality_falls_back_to_first_listed() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media("xyz-480", MediaFile::ranged(media_bytes(800), "video/webm"));
    upstream.add_media("xyz-720", MediaFile::ranged(vec![7; 1200], "video/mp4"));
    upstream.add_item("XYZ", &[("480p", "xyz-480"), ("720p", "xyz-720")]);
    let gateway = Gateway::start(&upstream).await;

    let response = gateway
        .fetch("/stream/XYZ?quality=1080p", Some("bytes=0-99"))
        .await;

    assert_eq!(response.status(), 206);
    assert_eq!(header(&response, "content-range"), Some("bytes 0-99/800"));
    assert_eq!(header(&response, "content-type"), Some("video/webm"));
    assert_eq!(&response.bytes().await.unwrap()[..], &media_bytes(800)[..100]);

    let events = gateway.events.events();
    assert!(events.iter().all(|event| event.quality == "480p"));
}

#[tokio::test]
async fn test_exact_quality_wins_over_order() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media("xyz-480", MediaFile::ranged(media_bytes(800), "video/webm"));
    upstream.add_media("xyz-720", MediaFile::ranged(vec![7; 1200], "video/mp4"));
    upstream.add_item("XYZ", &[("480p", "xyz-480"), ("720p", "xyz-720")]);
    let gateway = Gateway::start(&upstream).await;

    let response = gateway.fetch("/stream/XYZ?quality=720p", None).await;

    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "content-length"), Some("1200"));
    assert_eq!(&response.bytes().await.unwrap()[..], &[7u8; 1200][..]);
}

#[tokio::test]
async fn test_default_quality_applies_without_query() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media("a", MediaFile::ranged(vec![1; 10], "video/mp4"));
    upstream.add_media("b", MediaFile::ranged(vec![2; 20], "video/mp4"));
    upstream.add_item("tt1", &[("1080p", "a"), ("720p", "b")]);
    let gateway = Gateway::start(&upstream).await;

    let response = gateway.fetch("/stream/tt1?quality=", None).await;

    assert_eq!(response.status(), 200);
    assert_eq!(&response.bytes().await.unwrap()[..], &[2u8; 20][..]);
}

#[tokio::test]
async fn test_unknown_item_is_not_found() {
    let upstream = FakeUpstream::start().await;
    let gateway = Gateway::start(&upstream).await;

    let response = gateway.fetch("/stream/nope?quality=720p", None).await;

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "item_not_found");
    assert_eq!(upstream.media_fetches(), 0);
}

#[tokio::test]
async fn test_sources_without_urls_are_quality_unavailable() {
    let upstream = FakeUpstream::start().await;
    upstream.add_listing(
        "nourl",
        json!({"success": true, "results": [{"quality": "720p", "download_url": ""}]}),
    );
    let gateway = Gateway::start(&upstream).await;

    let response = gateway.fetch("/download/nourl", None).await;

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "quality_unavailable");
}

#[tokio::test]
async fn test_catalog_failure_is_server_error() {
    let upstream = FakeUpstream::start().await;
    let gateway = Gateway::start(&upstream).await;

    let response = gateway.fetch("/stream/catalog-down", None).await;

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "upstream_unavailable");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_every_request_resolves_fresh() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media("m", MediaFile::ranged(vec![0; 16], "video/mp4"));
    upstream.add_item("tt2", &[("720p", "m")]);
    let gateway = Gateway::start(&upstream).await;

    for _ in 0..3 {
        let response = gateway.fetch("/stream/tt2", None).await;
        assert_eq!(response.bytes().await.unwrap().len(), 16);
    }
    assert_eq!(upstream.source_calls(), 3);
}

#[tokio::test]
async fn test_padded_item_id_reaches_upstream_unchanged() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media("padded", MediaFile::ranged(media_bytes(32), "video/mp4"));
    upstream.add_item(" XYZ", &[("720p", "padded")]);
    let gateway = Gateway::start(&upstream).await;

    let response = gateway.fetch("/download/%20XYZ?quality=720p", None).await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        header(&response, "content-disposition"),
        Some("attachment; filename=\"_XYZ_720p.mp4\"")
    );
    assert_eq!(response.bytes().await.unwrap().len(), 32);
}
