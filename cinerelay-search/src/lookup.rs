//! Upstream metadata lookups.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cinerelay_core::config::UpstreamConfig;
use cinerelay_core::http::upstream_url;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::cache::MetadataCache;
use crate::errors::MetadataError;

/// Forwards search, info and trending requests to the upstream catalog.
///
/// Bodies are passed through as opaque JSON. Only successful answers are
/// cached, keyed by the full upstream URL.
#[derive(Clone)]
pub struct MetadataLookup {
    client: Client,
    upstream: UpstreamConfig,
    cache: Arc<dyn MetadataCache>,
}

impl MetadataLookup {
    pub fn new(client: Client, upstream: &UpstreamConfig, cache: Arc<dyn MetadataCache>) -> Self {
        Self {
            client,
            upstream: upstream.clone(),
            cache,
        }
    }

    /// Searches the upstream catalog.
    ///
    /// # Errors
    ///
    /// - `MetadataError::InvalidQuery` - Query is empty
    /// - `MetadataError::NetworkError` - Upstream could not be reached
    /// - `MetadataError::Timeout` - Upstream did not answer in time
    /// - `MetadataError::UpstreamStatus` - Upstream answered a non-success status
    /// - `MetadataError::ParseError` - Upstream body is not JSON
    pub async fn search(&self, query: &str, page: Option<u32>) -> crate::Result<Value> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MetadataError::InvalidQuery {
                reason: "search query must not be empty".to_string(),
            });
        }
        let url = self.search_url(query, page)?;
        self.fetch_json(&url).await
    }

    /// Fetches upstream details of one item.
    ///
    /// # Errors
    ///
    /// - `MetadataError::InvalidQuery` - Item id is empty
    /// - `MetadataError::NetworkError` - Upstream could not be reached
    /// - `MetadataError::Timeout` - Upstream did not answer in time
    /// - `MetadataError::UpstreamStatus` - Upstream answered a non-success status
    /// - `MetadataError::ParseError` - Upstream body is not JSON
    pub async fn info(&self, item_id: &str) -> crate::Result<Value> {
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return Err(MetadataError::InvalidQuery {
                reason: "item id must not be empty".to_string(),
            });
        }
        let url = upstream_url(
            &self.upstream.base_url,
            &self.upstream.info_path,
            &[("id", item_id)],
        );
        self.fetch_json(&url).await
    }

    /// Fetches the upstream trending list.
    ///
    /// # Errors
    ///
    /// - `MetadataError::NetworkError` - Upstream could not be reached
    /// - `MetadataError::Timeout` - Upstream did not answer in time
    /// - `MetadataError::UpstreamStatus` - Upstream answered a non-success status
    /// - `MetadataError::ParseError` - Upstream body is not JSON
    pub async fn trending(&self) -> crate::Result<Value> {
        let url = upstream_url(&self.upstream.base_url, &self.upstream.trending_path, &[]);
        self.fetch_json(&url).await
    }

    fn search_url(&self, query: &str, page: Option<u32>) -> crate::Result<String> {
        let base = upstream_url(
            &self.upstream.base_url,
            &self.upstream.search_path,
            &[("query", query)],
        );
        let Some(page) = page else {
            return Ok(base);
        };

        let mut url = Url::parse(&base).map_err(|e| MetadataError::InvalidQuery {
            reason: format!("search URL {base} is invalid: {e}"),
        })?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        Ok(url.into())
    }

    async fn fetch_json(&self, url: &str) -> crate::Result<Value> {
        if let Some(cached) = self.cache.lookup(url) {
            debug!("Metadata cache hit for {}", url);
            return Ok(cached);
        }

        let timeout = self.upstream.request_timeout;
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Metadata upstream answered {} for {}", status, url);
            return Err(MetadataError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                MetadataError::Timeout { timeout }
            } else {
                MetadataError::ParseError {
                    reason: e.to_string(),
                }
            }
        })?;

        self.cache.store(url, body.clone());
        Ok(body)
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> MetadataError {
    if error.is_timeout() {
        MetadataError::Timeout { timeout }
    } else {
        MetadataError::NetworkError {
            reason: error.to_string(),
        }
    }
}

impl fmt::Debug for MetadataLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataLookup")
            .field("base_url", &self.upstream.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio_test::assert_err;

    use super::*;
    use crate::cache::TtlCache;

    #[derive(Default)]
    struct RecordingCache {
        lookups: Mutex<Vec<String>>,
    }

    impl MetadataCache for RecordingCache {
        fn lookup(&self, key: &str) -> Option<Value> {
            self.lookups.lock().push(key.to_string());
            None
        }

        fn store(&self, _key: &str, _value: Value) {}
    }

    fn lookup_with(cache: Arc<dyn MetadataCache>) -> MetadataLookup {
        let upstream = UpstreamConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            request_timeout: Duration::from_millis(500),
            ..UpstreamConfig::default()
        };
        MetadataLookup::new(Client::new(), &upstream, cache)
    }

    #[test]
    fn test_search_url_encodes_query_and_page() {
        let lookup = lookup_with(Arc::new(RecordingCache::default()));

        assert_eq!(
            lookup.search_url("the matrix", None).unwrap(),
            "http://127.0.0.1:9/api/search/the%20matrix"
        );
        assert_eq!(
            lookup.search_url("a/b", Some(2)).unwrap(),
            "http://127.0.0.1:9/api/search/a%2Fb?page=2"
        );
    }

    #[tokio::test]
    async fn test_empty_query_never_reaches_upstream() {
        let cache = Arc::new(RecordingCache::default());
        let lookup = lookup_with(cache.clone());

        let err = assert_err!(lookup.search("   ", None).await);
        assert!(err.is_client_error());
        let err = assert_err!(lookup.info("").await);
        assert!(matches!(err, MetadataError::InvalidQuery { .. }));
        assert!(cache.lookups.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cached_body_skips_upstream() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60), 8));
        cache.store("http://127.0.0.1:9/api/trending", json!({"results": ["tt1"]}));
        let lookup = lookup_with(cache);

        let body = lookup.trending().await.unwrap();
        assert_eq!(body, json!({"results": ["tt1"]}));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_not_cached() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60), 8));
        let lookup = lookup_with(cache.clone());

        let err = assert_err!(lookup.info("tt1").await);
        assert!(matches!(
            err,
            MetadataError::NetworkError { .. } | MetadataError::Timeout { .. }
        ));
        assert!(cache.is_empty());
    }
}
