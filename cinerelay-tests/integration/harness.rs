//! Gateway under test.

use std::sync::Arc;
use std::time::Duration;

use cinerelay_core::catalog::{HttpCatalog, SourceResolver};
use cinerelay_core::config::StreamingConfig;
use cinerelay_core::hooks::{AllowAll, MemoryEventSink, StreamEventKind};
use cinerelay_core::http::build_client;
use cinerelay_core::{GatewayConfig, StreamProxy};
use cinerelay_search::{MetadataLookup, TtlCache};
use cinerelay_web::{AppState, router};
use tokio::net::TcpListener;

use crate::fake_upstream::FakeUpstream;

pub struct Gateway {
    pub base_url: String,
    pub events: Arc<MemoryEventSink>,
    pub http: reqwest::Client,
}

impl Gateway {
    pub async fn start(upstream: &FakeUpstream) -> Self {
        Self::start_with(upstream, test_streaming_config()).await
    }

    pub async fn start_with(upstream: &FakeUpstream, streaming: StreamingConfig) -> Self {
        let mut config = GatewayConfig::default();
        config.upstream.base_url = upstream.base_url.clone();
        config.upstream.request_timeout = Duration::from_secs(5);
        config.streaming = streaming;

        let client = build_client(&config.upstream).unwrap();
        let events = Arc::new(MemoryEventSink::new());
        let state = AppState {
            resolver: SourceResolver::new(Arc::new(HttpCatalog::new(
                client.clone(),
                &config.upstream,
            ))),
            proxy: StreamProxy::new(client.clone(), config.streaming.clone(), events.clone()),
            metadata: MetadataLookup::new(
                client,
                &config.upstream,
                Arc::new(TtlCache::from_config(&config.cache)),
            ),
            access: Arc::new(AllowAll),
            default_quality: config.default_quality.clone(),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.ok();
        });

        Self {
            base_url: format!("http://{address}"),
            events,
            http: reqwest::Client::new(),
        }
    }

    pub async fn fetch(&self, path: &str, range: Option<&str>) -> reqwest::Response {
        let mut request = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(range) = range {
            request = request.header(reqwest::header::RANGE, range);
        }
        request.send().await.unwrap()
    }

    /// Event kinds once the stream reached a terminal event, or after 5s.
    pub async fn settled_events(&self) -> Vec<StreamEventKind> {
        for _ in 0..250 {
            let kinds = self.events.kinds();
            if kinds.last().is_some_and(|kind| kind.is_terminal()) {
                return kinds;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.events.kinds()
    }
}

pub fn test_streaming_config() -> StreamingConfig {
    StreamingConfig {
        probe_timeout: Duration::from_secs(2),
        fetch_timeout: Duration::from_secs(5),
        read_idle_timeout: Duration::from_secs(2),
        relay_buffer_chunks: 4,
    }
}

pub fn header<'a>(response: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}
