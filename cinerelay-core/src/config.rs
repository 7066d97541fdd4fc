//! Centralized configuration for Cinerelay.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

use crate::CinerelayError;

/// Central configuration for all Cinerelay components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub upstream: UpstreamConfig,
    pub streaming: StreamingConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    /// Quality label used when a request carries no `quality` parameter
    pub default_quality: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            streaming: StreamingConfig::default(),
            cache: CacheConfig::default(),
            server: ServerConfig::default(),
            default_quality: "720p".to_string(),
        }
    }
}

/// Upstream movie catalog API configuration.
///
/// Path templates are appended to `base_url`; `{id}` and `{query}` are
/// replaced with percent-encoded values.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the upstream API
    pub base_url: String,
    /// Download sources endpoint, must contain `{id}`
    pub sources_path: String,
    /// Search endpoint, must contain `{query}`
    pub search_path: String,
    /// Item metadata endpoint, must contain `{id}`
    pub info_path: String,
    /// Trending listing endpoint
    pub trending_path: String,
    /// User agent sent on every upstream request
    pub user_agent: String,
    /// Timeout for catalog and metadata calls
    pub request_timeout: Duration,
    /// TCP connect timeout for all upstream connections
    pub connect_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            sources_path: "/api/sources/{id}".to_string(),
            search_path: "/api/search/{query}".to_string(),
            info_path: "/api/info/{id}".to_string(),
            trending_path: "/api/trending".to_string(),
            user_agent: "cinerelay/0.1.0".to_string(),
            request_timeout: Duration::from_secs(12),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Media relay configuration.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Timeout for the metadata probe issued before a ranged fetch
    pub probe_timeout: Duration,
    /// Timeout until the media response headers arrive
    pub fetch_timeout: Duration,
    /// Longest tolerated gap between two upstream body chunks
    pub read_idle_timeout: Duration,
    /// Number of chunks buffered between upstream and client
    pub relay_buffer_chunks: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(8),
            fetch_timeout: Duration::from_secs(45),
            read_idle_timeout: Duration::from_secs(30),
            relay_buffer_chunks: 8,
        }
    }
}

/// Metadata response cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a cached metadata response
    pub ttl: Duration,
    /// Maximum number of cached responses
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300), // 5 minutes
            max_entries: 512,
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl GatewayConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests supply a map instead of mutating the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("CINERELAY_UPSTREAM_URL") {
            config.upstream.base_url = url;
        }
        if let Some(path) = lookup("CINERELAY_SOURCES_PATH") {
            config.upstream.sources_path = path;
        }
        if let Some(agent) = lookup("CINERELAY_USER_AGENT") {
            config.upstream.user_agent = agent;
        }
        if let Some(timeout) = seconds(&lookup, "CINERELAY_REQUEST_TIMEOUT") {
            config.upstream.request_timeout = timeout;
        }

        if let Some(timeout) = seconds(&lookup, "CINERELAY_PROBE_TIMEOUT") {
            config.streaming.probe_timeout = timeout;
        }
        if let Some(timeout) = seconds(&lookup, "CINERELAY_FETCH_TIMEOUT") {
            config.streaming.fetch_timeout = timeout;
        }
        if let Some(timeout) = seconds(&lookup, "CINERELAY_IDLE_TIMEOUT") {
            config.streaming.read_idle_timeout = timeout;
        }
        if let Some(chunks) = lookup("CINERELAY_RELAY_BUFFER").and_then(|v| v.parse().ok()) {
            config.streaming.relay_buffer_chunks = chunks;
        }

        if let Some(ttl) = seconds(&lookup, "CINERELAY_CACHE_TTL") {
            config.cache.ttl = ttl;
        }

        if let Some(host) = lookup("CINERELAY_HOST") {
            config.server.host = host;
        }
        if let Some(port) = lookup("CINERELAY_PORT").and_then(|v| v.parse().ok()) {
            config.server.port = port;
        }

        if let Some(quality) = lookup("CINERELAY_DEFAULT_QUALITY") {
            config.default_quality = quality;
        }

        config
    }

    /// Checks that the configuration can drive a running gateway.
    ///
    /// # Errors
    ///
    /// - `CinerelayError::Configuration` - Base URL, path templates, timeouts or relay buffer are invalid
    pub fn validate(&self) -> crate::Result<()> {
        let url = url::Url::parse(&self.upstream.base_url).map_err(|e| {
            CinerelayError::Configuration {
                reason: format!("upstream URL '{}' is invalid: {e}", self.upstream.base_url),
            }
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CinerelayError::Configuration {
                reason: format!("upstream URL scheme '{}' is not http(s)", url.scheme()),
            });
        }

        let templates = [
            ("sources path", &self.upstream.sources_path, "{id}"),
            ("info path", &self.upstream.info_path, "{id}"),
            ("search path", &self.upstream.search_path, "{query}"),
        ];
        for (name, template, placeholder) in templates {
            if !template.contains(placeholder) {
                return Err(CinerelayError::Configuration {
                    reason: format!("{name} '{template}' must contain {placeholder}"),
                });
            }
        }

        let timeouts = [
            ("request timeout", self.upstream.request_timeout),
            ("connect timeout", self.upstream.connect_timeout),
            ("probe timeout", self.streaming.probe_timeout),
            ("fetch timeout", self.streaming.fetch_timeout),
            ("idle timeout", self.streaming.read_idle_timeout),
        ];
        for (name, timeout) in timeouts {
            if timeout.is_zero() {
                return Err(CinerelayError::Configuration {
                    reason: format!("{name} must be greater than zero"),
                });
            }
        }

        if self.streaming.relay_buffer_chunks == 0 {
            return Err(CinerelayError::Configuration {
                reason: "relay buffer must hold at least one chunk".to_string(),
            });
        }

        Ok(())
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    lookup(key)
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_quality, "720p");
        assert_eq!(config.streaming.probe_timeout, Duration::from_secs(8));
    }

    #[test]
    fn test_lookup_overrides() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("CINERELAY_UPSTREAM_URL", "https://api.example.net"),
            ("CINERELAY_PROBE_TIMEOUT", "3"),
            ("CINERELAY_RELAY_BUFFER", "2"),
            ("CINERELAY_PORT", "8088"),
            ("CINERELAY_DEFAULT_QUALITY", "1080p"),
        ]));

        assert_eq!(config.upstream.base_url, "https://api.example.net");
        assert_eq!(config.streaming.probe_timeout, Duration::from_secs(3));
        assert_eq!(config.streaming.relay_buffer_chunks, 2);
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.default_quality, "1080p");
    }

    #[test]
    fn test_malformed_overrides_keep_defaults() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("CINERELAY_FETCH_TIMEOUT", "soon"),
            ("CINERELAY_PORT", "-1"),
        ]));

        assert_eq!(config.streaming.fetch_timeout, Duration::from_secs(45));
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_validate_rejects_bad_upstream() {
        let mut config = GatewayConfig::default();
        config.upstream.base_url = "ftp://catalog.example".to_string();
        assert!(matches!(
            config.validate(),
            Err(CinerelayError::Configuration { .. })
        ));

        config.upstream.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_template_without_placeholder() {
        let mut config = GatewayConfig::default();
        config.upstream.sources_path = "/api/sources".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("{id}"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout_and_buffer() {
        let mut config = GatewayConfig::default();
        config.streaming.probe_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.streaming.relay_buffer_chunks = 0;
        assert!(config.validate().is_err());
    }
}
