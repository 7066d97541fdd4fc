//! HTTP implementation of the catalog against the upstream sources endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{Catalog, CatalogError, SourceListing};
use crate::config::UpstreamConfig;
use crate::http::upstream_url;

/// Catalog backed by the upstream REST API.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: String,
    sources_path: String,
    timeout: Duration,
}

impl HttpCatalog {
    /// Creates a catalog client sharing the given HTTP client.
    pub fn new(client: Client, config: &UpstreamConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            sources_path: config.sources_path.clone(),
            timeout: config.request_timeout,
        }
    }

    fn sources_url(&self, item_id: &str) -> String {
        upstream_url(&self.base_url, &self.sources_path, &[("id", item_id)])
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn sources(&self, item_id: &str) -> Result<SourceListing, CatalogError> {
        let url = self.sources_url(item_id);
        debug!("Fetching sources for {} from {}", item_id, url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("sources request timed out after {:?}", self.timeout)
                } else {
                    format!("sources request failed: {e}")
                };
                warn!("Catalog lookup for {} failed: {}", item_id, reason);
                CatalogError::UpstreamUnavailable { reason }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Catalog returned HTTP {} for {}", status.as_u16(), item_id);
            return Err(CatalogError::UpstreamUnavailable {
                reason: format!("sources endpoint returned HTTP {}", status.as_u16()),
            });
        }

        response
            .json::<SourceListing>()
            .await
            .map_err(|e| CatalogError::UpstreamUnavailable {
                reason: format!("sources response could not be decoded: {e}"),
            })
    }
}
