//! Upstream size probe.

use std::time::Duration;

use axum::http::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use reqwest::Client;
use tracing::debug;

use super::{StreamingError, StreamingResult};

/// What the probe learned about the upstream media.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaProbe {
    /// Authoritative total size, when upstream disclosed it
    pub total_size: Option<u64>,
    pub content_type: Option<HeaderValue>,
}

/// Asks upstream for the first byte to learn the total size and content type.
///
/// A `206` answer yields the size from `Content-Range`, a `200` answer from
/// `Content-Length`. The probe body is dropped unread; `timeout` bounds the
/// wait for response headers.
///
/// # Errors
///
/// - `StreamingError::UpstreamTimeout` - No response headers within `timeout`
/// - `StreamingError::UpstreamUnavailable` - Connection failed or upstream answered non-2xx
pub async fn probe_media(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> StreamingResult<MediaProbe> {
    let request = client.get(url).header(RANGE, "bytes=0-0").send();
    let response = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| StreamingError::UpstreamTimeout {
            stage: "probe",
            timeout,
        })?
        .map_err(|e| StreamingError::UpstreamUnavailable {
            reason: format!("probe request failed: {e}"),
        })?;

    let status = response.status();
    let headers = response.headers();
    let total_size = match status {
        StatusCode::PARTIAL_CONTENT => header_str(headers, CONTENT_RANGE.as_str())
            .and_then(parse_content_range_total),
        StatusCode::OK => header_str(headers, CONTENT_LENGTH.as_str())
            .and_then(|value| value.trim().parse().ok()),
        other => {
            return Err(StreamingError::UpstreamUnavailable {
                reason: format!("probe answered HTTP {other}"),
            });
        }
    };

    let probe = MediaProbe {
        total_size,
        content_type: headers.get(CONTENT_TYPE).cloned(),
    };
    debug!(
        "Probe of {} answered {}: size {:?}",
        url, status, probe.total_size
    );
    Ok(probe)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Total size from a `Content-Range` value such as `bytes 0-0/1500`.
///
/// Returns `None` for an unknown total (`*`) or an unparseable value.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

/// First and last byte position from a `Content-Range` value such as
/// `bytes 100-199/1500`.
pub fn parse_content_range_bounds(value: &str) -> Option<(u64, u64)> {
    let (range, _) = value.trim().rsplit_once('/')?;
    let (unit, bounds) = range.trim().split_once(' ')?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return None;
    }
    let (first, last) = bounds.trim().split_once('-')?;
    Some((first.trim().parse().ok()?, last.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-0/1500"), Some(1500));
        assert_eq!(parse_content_range_total("bytes 0-0/ 42 "), Some(42));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
        assert_eq!(parse_content_range_total("bytes 0-0"), None);
        assert_eq!(parse_content_range_total(""), None);
    }

    #[test]
    fn test_parse_content_range_bounds() {
        assert_eq!(
            parse_content_range_bounds("bytes 100-199/1500"),
            Some((100, 199))
        );
        assert_eq!(parse_content_range_bounds("Bytes 0-0/*"), Some((0, 0)));
        assert_eq!(parse_content_range_bounds("bytes */1500"), None);
        assert_eq!(parse_content_range_bounds("items 1-2/3"), None);
        assert_eq!(parse_content_range_bounds("bytes 5-/10"), None);
    }
}
