//! Client disconnects and stalled upstreams mid-relay.

use std::time::Duration;

use cinerelay_core::StreamEventKind;

use crate::fake_upstream::{FakeUpstream, MediaFile, MediaMode, media_bytes};
use crate::harness::{Gateway, header, test_streaming_config};

#[tokio::test]
async fn test_client_disconnect_aborts_upstream() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media(
        "slow",
        MediaFile::new(Vec::new(), "video/mp4", MediaMode::Slow { chunks: 5000 }),
    );
    upstream.add_item("slow", &[("720p", "slow")]);
    let gateway = Gateway::start(&upstream).await;

    let mut response = gateway.fetch("/stream/slow", None).await;
    assert_eq!(response.status(), 200);

    let mut received = 0;
    while received < 8 * 1024 {
        let chunk = response.chunk().await.unwrap().unwrap();
        received += chunk.len();
    }
    drop(response);

    let mut aborted = false;
    for _ in 0..250 {
        if upstream.slow_body_dropped() {
            aborted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(aborted, "upstream body still being produced after disconnect");

    assert_eq!(
        gateway.settled_events().await,
        vec![StreamEventKind::Started, StreamEventKind::Aborted]
    );
}

#[tokio::test]
async fn test_client_disconnect_aborts_ranged_relay() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media(
        "slow",
        MediaFile::new(Vec::new(), "video/mp4", MediaMode::SlowRanged { chunks: 5000 }),
    );
    upstream.add_item("slow", &[("720p", "slow")]);
    let gateway = Gateway::start(&upstream).await;

    let mut response = gateway.fetch("/stream/slow", Some("bytes=1024-")).await;
    assert_eq!(response.status(), 206);
    let expected = format!("bytes 1024-{}/{}", 5000 * 1024 - 1, 5000 * 1024);
    assert_eq!(header(&response, "content-range"), Some(expected.as_str()));

    let mut received = 0;
    while received < 8 * 1024 {
        let chunk = response.chunk().await.unwrap().unwrap();
        received += chunk.len();
    }
    drop(response);

    let mut aborted = false;
    for _ in 0..250 {
        if upstream.slow_body_dropped() {
            aborted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(aborted, "ranged upstream body still being produced after disconnect");

    assert_eq!(
        gateway.settled_events().await,
        vec![StreamEventKind::Started, StreamEventKind::Aborted]
    );
}

#[tokio::test]
async fn test_stalled_upstream_cuts_connection() {
    let upstream = FakeUpstream::start().await;
    upstream.add_media(
        "stall",
        MediaFile::new(media_bytes(1000), "video/mp4", MediaMode::Stalls),
    );
    upstream.add_item("stall", &[("720p", "stall")]);

    let mut streaming = test_streaming_config();
    streaming.read_idle_timeout = Duration::from_millis(200);
    let gateway = Gateway::start_with(&upstream, streaming).await;

    let response = gateway.fetch("/stream/stall", None).await;
    assert_eq!(response.status(), 200);
    assert!(response.bytes().await.is_err());

    assert_eq!(
        gateway.settled_events().await,
        vec![StreamEventKind::Started, StreamEventKind::Failed]
    );
}
