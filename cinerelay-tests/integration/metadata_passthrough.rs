//! `/api/*` pass-through endpoints and health.

use serde_json::Value;

use crate::fake_upstream::FakeUpstream;
use crate::harness::Gateway;

async fn json(gateway: &Gateway, path: &str) -> (u16, Value) {
    let response = gateway.fetch(path, None).await;
    let status = response.status().as_u16();
    (status, response.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_search_is_forwarded_and_cached() {
    let upstream = FakeUpstream::start().await;
    let gateway = Gateway::start(&upstream).await;

    let (status, first) = json(&gateway, "/api/search?q=the%20matrix").await;
    assert_eq!(status, 200);
    assert_eq!(first["query"], "the matrix");
    assert_eq!(first["results"][0]["id"], "tt0133093");

    let (_, second) = json(&gateway, "/api/search?q=the%20matrix").await;
    assert_eq!(first, second);
    assert_eq!(upstream.metadata_calls(), 1);
}

#[tokio::test]
async fn test_search_page_is_part_of_the_key() {
    let upstream = FakeUpstream::start().await;
    let gateway = Gateway::start(&upstream).await;

    let (_, page_one) = json(&gateway, "/api/search?q=alien").await;
    let (_, page_two) = json(&gateway, "/api/search?q=alien&page=2").await;

    assert_eq!(page_one["page"], Value::Null);
    assert_eq!(page_two["page"], "2");
    assert_eq!(upstream.metadata_calls(), 2);
}

#[tokio::test]
async fn test_empty_search_is_rejected_locally() {
    let upstream = FakeUpstream::start().await;
    let gateway = Gateway::start(&upstream).await;

    let (status, body) = json(&gateway, "/api/search?q=%20").await;
    assert_eq!(status, 400);
    assert!(body["error"].is_string());
    assert_eq!(upstream.metadata_calls(), 0);
}

#[tokio::test]
async fn test_info_and_trending() {
    let upstream = FakeUpstream::start().await;
    let gateway = Gateway::start(&upstream).await;

    let (status, info) = json(&gateway, "/api/info/tt42").await;
    assert_eq!(status, 200);
    assert_eq!(info["title"], "Movie tt42");

    let (status, trending) = json(&gateway, "/api/trending").await;
    assert_eq!(status, 200);
    assert_eq!(trending["results"][1], "tt2");
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway_and_not_cached() {
    let upstream = FakeUpstream::start().await;
    let gateway = Gateway::start(&upstream).await;

    for _ in 0..2 {
        let (status, body) = json(&gateway, "/api/info/missing").await;
        assert_eq!(status, 502);
        assert_eq!(body["error"], "upstream_error");
    }
    assert_eq!(upstream.metadata_calls(), 2);
}

#[tokio::test]
async fn test_health() {
    let upstream = FakeUpstream::start().await;
    let gateway = Gateway::start(&upstream).await;

    let (status, body) = json(&gateway, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}
