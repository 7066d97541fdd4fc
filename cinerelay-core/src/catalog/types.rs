//! Wire types of the upstream sources endpoint and the resolved media source.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Response body of the upstream sources endpoint.
///
/// `{ "success": true, "results": [{ "quality", "download_url", "size", "format" }] }`
#[derive(Debug, Clone, Deserialize)]
pub struct SourceListing {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, deserialize_with = "nullable_list")]
    pub results: Vec<SourceEntry>,
}

fn default_success() -> bool {
    true
}

/// One rendition as listed by upstream.
///
/// Upstream is loose about types: labels and sizes arrive as either numbers
/// or strings, and any field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub quality: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub download_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_size")]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub format: Option<String>,
}

impl SourceEntry {
    /// Converts the entry into a `MediaSource` when it carries a download URL.
    pub fn into_media_source(self) -> Option<MediaSource> {
        let url = self.download_url?.trim().to_string();
        if url.is_empty() {
            return None;
        }

        Some(MediaSource {
            quality: self.quality.unwrap_or_default(),
            url,
            declared_size: self.size,
            format: self.format.filter(|f| !f.is_empty()),
        })
    }
}

/// A concrete rendition selected for relaying.
///
/// Resolved fresh for every request and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSource {
    /// Quality label as listed by upstream
    pub quality: String,
    /// Absolute media URL
    pub url: String,
    /// Size declared in the listing; may be stale or absent
    pub declared_size: Option<u64>,
    /// Container format, e.g. "mp4"
    pub format: Option<String>,
}

impl MediaSource {
    /// File extension for downloads, derived from the declared format.
    pub fn extension(&self) -> String {
        self.format
            .as_deref()
            .map(|f| f.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| "mp4".to_string())
    }
}

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<SourceEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<SourceEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_accepts_loose_types() {
        let json = r#"{
            "success": true,
            "results": [
                {"quality": 1080, "download_url": "https://cdn/a.mp4", "size": "2048", "format": "MP4"},
                {"quality": "720p", "download_url": "https://cdn/b.mp4", "size": 1024}
            ]
        }"#;

        let listing: SourceListing = serde_json::from_str(json).unwrap();
        assert!(listing.success);
        assert_eq!(listing.results[0].quality.as_deref(), Some("1080"));
        assert_eq!(listing.results[0].size, Some(2048));
        assert_eq!(listing.results[1].size, Some(1024));
        assert_eq!(listing.results[1].format, None);
    }

    #[test]
    fn test_listing_defaults() {
        let listing: SourceListing = serde_json::from_str("{}").unwrap();
        assert!(listing.success);
        assert!(listing.results.is_empty());

        let listing: SourceListing =
            serde_json::from_str(r#"{"success": false, "results": null}"#).unwrap();
        assert!(!listing.success);
        assert!(listing.results.is_empty());
    }

    #[test]
    fn test_entry_without_url_is_unusable() {
        let entry = SourceEntry {
            quality: Some("480p".to_string()),
            download_url: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(entry.into_media_source(), None);
    }

    #[test]
    fn test_extension_from_format() {
        let mut source = SourceEntry {
            quality: Some("480p".to_string()),
            download_url: Some("https://cdn/x".to_string()),
            format: Some(".MKV".to_string()),
            ..Default::default()
        }
        .into_media_source()
        .unwrap();
        assert_eq!(source.extension(), "mkv");

        source.format = None;
        assert_eq!(source.extension(), "mp4");
    }
}
