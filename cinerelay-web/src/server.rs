//! Gateway HTTP server
//!
//! Wires the upstream client, resolver, stream proxy and metadata lookup into
//! one shared state and serves the router until shutdown is signalled.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use cinerelay_core::catalog::HttpCatalog;
use cinerelay_core::hooks::TracingEventSink;
use cinerelay_core::http::build_client;
use cinerelay_core::{AccessPolicy, AllowAll, GatewayConfig, SourceResolver, StreamProxy};
use cinerelay_search::{MetadataLookup, TtlCache};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{
    api_info, api_search, api_trending, download_media, health, stream_media,
};

/// Shared request state; cloned per request, every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub resolver: SourceResolver,
    pub proxy: StreamProxy,
    pub metadata: MetadataLookup,
    pub access: Arc<dyn AccessPolicy>,
    pub default_quality: String,
}

impl AppState {
    /// Builds production state: one shared upstream client, tracing event
    /// sink, TTL metadata cache and an allow-all access policy.
    ///
    /// # Errors
    ///
    /// - `CinerelayError::Http` - Upstream HTTP client could not be built
    pub fn from_config(config: &GatewayConfig) -> cinerelay_core::Result<Self> {
        let client = build_client(&config.upstream)?;
        let catalog = Arc::new(HttpCatalog::new(client.clone(), &config.upstream));
        let cache = Arc::new(TtlCache::from_config(&config.cache));

        Ok(Self {
            resolver: SourceResolver::new(catalog),
            proxy: StreamProxy::new(
                client.clone(),
                config.streaming.clone(),
                Arc::new(TracingEventSink),
            ),
            metadata: MetadataLookup::new(client, &config.upstream, cache),
            access: Arc::new(AllowAll),
            default_quality: config.default_quality.clone(),
        })
    }

    pub fn with_access_policy(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }
}

/// Routes of the gateway.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream/{item_id}", get(stream_media))
        .route("/download/{item_id}", get(download_media))
        .route("/api/search", get(api_search))
        .route("/api/info/{item_id}", get(api_info))
        .route("/api/trending", get(api_trending))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the configured address and serves until `shutdown` resolves.
///
/// # Errors
///
/// - `CinerelayError::Http` - Upstream HTTP client could not be built
/// - `CinerelayError::Io` - Address could not be bound or the listener failed
pub async fn run_server(
    config: GatewayConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> cinerelay_core::Result<()> {
    let state = AppState::from_config(&config)?;
    let app = router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        "Cinerelay gateway listening on http://{} (upstream {})",
        listener.local_addr()?,
        config.upstream.base_url
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Cinerelay gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{HeaderMap, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    struct DenyAll;

    impl AccessPolicy for DenyAll {
        fn is_authorized(&self, _item_id: &str, _headers: &HeaderMap) -> bool {
            false
        }
    }

    fn test_state() -> AppState {
        let mut config = GatewayConfig::default();
        config.upstream.base_url = "http://127.0.0.1:9".to_string();
        AppState::from_config(&config).unwrap()
    }

    async fn send(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(router(test_state()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_rejected_access_is_forbidden() {
        let state = test_state().with_access_policy(Arc::new(DenyAll));

        let (status, body) = send(router(state.clone()), "/stream/XYZ?quality=720p").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let (status, _) = send(router(state), "/download/XYZ").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_blank_item_id_is_bad_request() {
        let (status, body) = send(router(test_state()), "/stream/%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_item_id");
    }

    #[tokio::test]
    async fn test_empty_search_is_bad_request() {
        let (status, _) = send(router(test_state()), "/api/search?q=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(router(test_state()), "/api/search").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_server_error() {
        let (status, body) = send(router(test_state()), "/stream/XYZ").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "upstream_unavailable");
    }
}
