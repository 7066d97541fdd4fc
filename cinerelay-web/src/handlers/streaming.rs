//! Stream and download handlers.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::RANGE;
use axum::response::Response;
use cinerelay_core::StreamTarget;
use serde::Deserialize;
use tracing::{debug, warn};

use super::ApiError;
use crate::server::AppState;

/// Query parameters shared by `/stream` and `/download`.
#[derive(Debug, Default, Deserialize)]
pub struct QualityQuery {
    /// Requested rendition label; the configured default when absent or empty
    pub quality: Option<String>,
}

/// `GET /stream/{item_id}?quality=` with an optional `Range` header.
pub async fn stream_media(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Query(query): Query<QualityQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target = resolve_target(&state, &item_id, query, &headers).await?;

    let range = headers.get(RANGE).and_then(|value| value.to_str().ok());
    if let Some(range) = range {
        debug!("Range {} requested for {}", range, target.item_id);
    }

    Ok(state.proxy.stream(&target, range).await?)
}

/// `GET /download/{item_id}?quality=`, always the whole file as an attachment.
pub async fn download_media(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Query(query): Query<QualityQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target = resolve_target(&state, &item_id, query, &headers).await?;
    Ok(state.proxy.download(&target).await?)
}

/// Authorizes the request, then resolves the source to relay.
async fn resolve_target(
    state: &AppState,
    item_id: &str,
    query: QualityQuery,
    headers: &HeaderMap,
) -> Result<StreamTarget, ApiError> {
    if !state.access.is_authorized(item_id, headers) {
        warn!("Access policy rejected {}", item_id);
        return Err(ApiError::forbidden());
    }

    let quality = query
        .quality
        .filter(|quality| !quality.trim().is_empty())
        .unwrap_or_else(|| state.default_quality.clone());
    let source = state.resolver.resolve(item_id, &quality).await?;

    Ok(StreamTarget::new(item_id, quality, source))
}
