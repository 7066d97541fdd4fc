//! JSON error responses.

use axum::Json;
use axum::http::header::CONTENT_RANGE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use cinerelay_core::streaming::range::unsatisfied_content_range;
use cinerelay_core::{CatalogError, StreamingError};
use cinerelay_search::MetadataError;
use serde::Serialize;
use tracing::{error, warn};

/// Error reported before any response byte was written.
///
/// Serialized as `{"error": code, "message": detail}`; a 416 additionally
/// carries `Content-Range: bytes */{size}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: Option<String>,
    pub content_range: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: Some(message.into()),
            content_range: None,
        }
    }

    pub fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            error: "forbidden",
            message: None,
            content_range: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let message = err.to_string();
        match err {
            CatalogError::InvalidItemId { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_item_id", message)
            }
            CatalogError::ItemNotFound { .. } => {
                Self::new(StatusCode::NOT_FOUND, "item_not_found", message)
            }
            CatalogError::QualityUnavailable { .. } => {
                Self::new(StatusCode::NOT_FOUND, "quality_unavailable", message)
            }
            CatalogError::UpstreamUnavailable { .. } => {
                error!("Source resolution failed: {}", message);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upstream_unavailable",
                    message,
                )
            }
        }
    }
}

impl From<StreamingError> for ApiError {
    fn from(err: StreamingError) -> Self {
        let message = err.to_string();
        match err {
            StreamingError::RangeNotSatisfiable { total_size } => Self {
                status: StatusCode::RANGE_NOT_SATISFIABLE,
                error: "range_not_satisfiable",
                message: Some(message),
                content_range: Some(unsatisfied_content_range(total_size)),
            },
            StreamingError::UpstreamTimeout { .. } => {
                warn!("Stream setup timed out: {}", message);
                Self::new(StatusCode::GATEWAY_TIMEOUT, "upstream_timeout", message)
            }
            StreamingError::UpstreamUnavailable { .. } => {
                error!("Stream setup failed: {}", message);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upstream_unavailable",
                    message,
                )
            }
            StreamingError::InternalRelayFailure { .. } => {
                error!("Stream setup failed: {}", message);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "relay_failure", message)
            }
        }
    }
}

impl From<MetadataError> for ApiError {
    fn from(err: MetadataError) -> Self {
        let message = err.to_string();
        match err {
            MetadataError::InvalidQuery { .. } => Self::bad_request(message),
            MetadataError::Timeout { .. } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "upstream_timeout", message)
            }
            MetadataError::NetworkError { .. }
            | MetadataError::UpstreamStatus { .. }
            | MetadataError::ParseError { .. } => {
                warn!("Metadata lookup failed: {}", message);
                Self::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            message: self.message.as_deref(),
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(value) = self
            .content_range
            .as_deref()
            .and_then(|range| HeaderValue::from_str(range).ok())
        {
            response.headers_mut().insert(CONTENT_RANGE, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::to_bytes;
    use serde_json::Value;

    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_catalog_status_mapping() {
        let cases = [
            (
                CatalogError::InvalidItemId {
                    reason: "empty".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                CatalogError::ItemNotFound {
                    item_id: "XYZ".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                CatalogError::QualityUnavailable {
                    item_id: "XYZ".to_string(),
                    quality: "720p".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                CatalogError::UpstreamUnavailable {
                    reason: "refused".to_string(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_streaming_status_mapping() {
        let timeout = ApiError::from(StreamingError::UpstreamTimeout {
            stage: "probe",
            timeout: Duration::from_secs(8),
        });
        assert_eq!(timeout.status, StatusCode::GATEWAY_TIMEOUT);

        let relay = ApiError::from(StreamingError::InternalRelayFailure {
            reason: "bad header".to_string(),
        });
        assert_eq!(relay.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_metadata_status_mapping() {
        let status = ApiError::from(MetadataError::UpstreamStatus { status: 503 }).status;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let status = ApiError::from(MetadataError::Timeout {
            timeout: Duration::from_secs(12),
        })
        .status;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

        let status = ApiError::from(MetadataError::InvalidQuery {
            reason: "empty".to_string(),
        })
        .status;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range_response() {
        let response =
            ApiError::from(StreamingError::RangeNotSatisfiable { total_size: 1500 }).into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes */1500");
        let body = body_json(response).await;
        assert_eq!(body["error"], "range_not_satisfiable");
    }

    #[tokio::test]
    async fn test_forbidden_has_no_message() {
        let response = ApiError::forbidden().into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({"error": "forbidden"}));
    }
}
