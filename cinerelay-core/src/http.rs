//! Shared upstream HTTP client and URL construction.

use reqwest::Client;

use crate::CinerelayError;
use crate::config::UpstreamConfig;

/// Builds the single `reqwest::Client` shared by catalog, proxy and metadata calls.
///
/// Only the connect timeout is set on the client; per-call deadlines differ
/// between catalog lookups and long-running media relays and are applied by
/// the callers.
///
/// # Errors
///
/// - `CinerelayError::Http` - TLS backend or client configuration failed to initialize
pub fn build_client(config: &UpstreamConfig) -> crate::Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| CinerelayError::Http {
            reason: e.to_string(),
        })
}

/// Joins a path template onto the upstream base URL.
///
/// `{id}` and `{query}` placeholders are replaced with their percent-encoded
/// values so identifiers containing `/` or spaces stay inside one path segment.
pub fn upstream_url(base_url: &str, template: &str, placeholders: &[(&str, &str)]) -> String {
    let mut path = template.to_string();
    for (name, value) in placeholders {
        path = path.replace(&format!("{{{name}}}"), &urlencoding::encode(value));
    }

    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_url_encodes_placeholders() {
        let url = upstream_url(
            "http://catalog.local/",
            "/api/sources/{id}",
            &[("id", "tt 01/2")],
        );
        assert_eq!(url, "http://catalog.local/api/sources/tt%2001%2F2");
    }

    #[test]
    fn test_upstream_url_without_leading_slash() {
        let url = upstream_url("http://catalog.local", "api/trending", &[]);
        assert_eq!(url, "http://catalog.local/api/trending");
    }

    #[test]
    fn test_build_client_from_defaults() {
        assert!(build_client(&UpstreamConfig::default()).is_ok());
    }
}
