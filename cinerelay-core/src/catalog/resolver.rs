//! Selection of one concrete media source for an item and quality label.

use std::sync::Arc;

use tracing::{debug, info};

use super::{Catalog, CatalogError, MediaSource};

/// Resolves `(item, quality)` pairs into a `MediaSource`.
///
/// Stateless apart from the catalog handle: every call hits upstream.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    catalog: Arc<dyn Catalog>,
}

impl SourceResolver {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Looks up the item's sources and selects the rendition to relay.
    ///
    /// The first entry whose label equals `quality` exactly wins. Without an
    /// exact match the first listed entry is used, in whatever order upstream
    /// returned them. The item id goes upstream as given; only a blank id is
    /// rejected.
    ///
    /// # Errors
    ///
    /// - `CatalogError::InvalidItemId` - Item id is empty
    /// - `CatalogError::UpstreamUnavailable` - Sources call failed or timed out
    /// - `CatalogError::ItemNotFound` - Upstream reported failure or listed nothing
    /// - `CatalogError::QualityUnavailable` - No listed entry carries a download URL
    pub async fn resolve(&self, item_id: &str, quality: &str) -> Result<MediaSource, CatalogError> {
        if item_id.trim().is_empty() {
            return Err(CatalogError::InvalidItemId {
                reason: "item id must not be empty".to_string(),
            });
        }

        let listing = self.catalog.sources(item_id).await?;
        if !listing.success || listing.results.is_empty() {
            return Err(CatalogError::ItemNotFound {
                item_id: item_id.to_string(),
            });
        }

        let listed = listing.results.len();
        let usable: Vec<MediaSource> = listing
            .results
            .into_iter()
            .filter_map(|entry| entry.into_media_source())
            .collect();
        if usable.len() < listed {
            debug!(
                "Skipped {} source entries without download URL for {}",
                listed - usable.len(),
                item_id
            );
        }

        let source =
            select_source(usable, quality).ok_or_else(|| CatalogError::QualityUnavailable {
                item_id: item_id.to_string(),
                quality: quality.to_string(),
            })?;

        if source.quality == quality {
            debug!("Resolved {} at requested quality {}", item_id, quality);
        } else {
            info!(
                "Quality {} unavailable for {}, falling back to first listed source {}",
                quality, item_id, source.quality
            );
        }

        Ok(source)
    }
}

/// Picks the first exact (case-sensitive) label match, else the first entry.
///
/// Upstream order is treated as opaque; entries are never ranked by bitrate
/// or size.
pub fn select_source(sources: Vec<MediaSource>, quality: &str) -> Option<MediaSource> {
    let exact = sources.iter().position(|source| source.quality == quality);
    sources.into_iter().nth(exact.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::catalog::{SourceEntry, SourceListing};

    #[derive(Debug, Default)]
    struct FixedCatalog {
        listing: Option<SourceListing>,
        calls: AtomicUsize,
        requested: Mutex<Vec<String>>,
    }

    impl FixedCatalog {
        fn with(success: bool, entries: Vec<SourceEntry>) -> Self {
            Self {
                listing: Some(SourceListing {
                    success,
                    results: entries,
                }),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Catalog for FixedCatalog {
        async fn sources(&self, item_id: &str) -> Result<SourceListing, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().push(item_id.to_string());
            self.listing
                .clone()
                .ok_or_else(|| CatalogError::UpstreamUnavailable {
                    reason: "connection refused".to_string(),
                })
        }
    }

    fn entry(quality: &str, url: &str) -> SourceEntry {
        SourceEntry {
            quality: Some(quality.to_string()),
            download_url: Some(url.to_string()),
            size: Some(10),
            format: Some("mp4".to_string()),
        }
    }

    fn resolver(catalog: FixedCatalog) -> SourceResolver {
        SourceResolver::new(Arc::new(catalog))
    }

    #[tokio::test]
    async fn test_exact_quality_match() {
        let resolver = resolver(FixedCatalog::with(
            true,
            vec![
                entry("480p", "https://cdn/480"),
                entry("1080p", "https://cdn/1080"),
                entry("720p", "https://cdn/720"),
            ],
        ));

        let source = assert_ok!(resolver.resolve("XYZ", "720p").await);
        assert_eq!(source.quality, "720p");
        assert_eq!(source.url, "https://cdn/720");
    }

    #[tokio::test]
    async fn test_fallback_is_first_listed_not_best() {
        let resolver = resolver(FixedCatalog::with(
            true,
            vec![entry("480p", "https://cdn/480"), entry("720p", "https://cdn/720")],
        ));

        let source = assert_ok!(resolver.resolve("XYZ", "1080p").await);
        assert_eq!(source.quality, "480p");
    }

    #[tokio::test]
    async fn test_match_is_case_sensitive() {
        let resolver = resolver(FixedCatalog::with(
            true,
            vec![entry("360p", "https://cdn/360"), entry("720P", "https://cdn/720")],
        ));

        let source = assert_ok!(resolver.resolve("XYZ", "720p").await);
        assert_eq!(source.quality, "360p");
    }

    #[tokio::test]
    async fn test_duplicate_labels_pick_first() {
        let resolver = resolver(FixedCatalog::with(
            true,
            vec![
                entry("720p", "https://cdn/first"),
                entry("720p", "https://cdn/second"),
            ],
        ));

        let source = assert_ok!(resolver.resolve("XYZ", "720p").await);
        assert_eq!(source.url, "https://cdn/first");
    }

    #[tokio::test]
    async fn test_unsuccessful_listing_is_not_found() {
        let resolver = resolver(FixedCatalog::with(false, vec![entry("720p", "u")]));
        let err = assert_err!(resolver.resolve("XYZ", "720p").await);
        assert!(matches!(err, CatalogError::ItemNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_listing_is_not_found() {
        let resolver = resolver(FixedCatalog::with(true, vec![]));
        let err = assert_err!(resolver.resolve("XYZ", "720p").await);
        assert!(matches!(err, CatalogError::ItemNotFound { .. }));
    }

    #[tokio::test]
    async fn test_entries_without_urls_are_quality_unavailable() {
        let mut broken = entry("720p", "");
        broken.download_url = None;
        let resolver = resolver(FixedCatalog::with(true, vec![broken, entry("1080p", " ")]));

        let err = assert_err!(resolver.resolve("XYZ", "720p").await);
        assert!(matches!(err, CatalogError::QualityUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let resolver = resolver(FixedCatalog::default());
        let err = assert_err!(resolver.resolve("XYZ", "720p").await);
        assert!(matches!(err, CatalogError::UpstreamUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_blank_item_id_skips_upstream() {
        let catalog = Arc::new(FixedCatalog::with(true, vec![entry("720p", "u")]));
        let resolver = SourceResolver::new(catalog.clone());

        let err = assert_err!(resolver.resolve("   ", "720p").await);
        assert!(matches!(err, CatalogError::InvalidItemId { .. }));
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_item_id_is_forwarded_verbatim() {
        let catalog = Arc::new(FixedCatalog::with(true, vec![entry("720p", "u")]));
        let resolver = SourceResolver::new(catalog.clone());

        assert_ok!(resolver.resolve(" tt0111161 ", "720p").await);
        assert_eq!(*catalog.requested.lock(), vec![" tt0111161 ".to_string()]);
    }

    #[test]
    fn test_select_source_on_empty_list() {
        assert_eq!(select_source(Vec::new(), "720p"), None);
    }
}
