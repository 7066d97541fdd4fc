//! Pass-through metadata endpoints and health check

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use super::ApiError;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
}

pub async fn api_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let text = query.q.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ApiError::bad_request("query parameter q is required"));
    }
    Ok(Json(state.metadata.search(&text, query.page).await?))
}

pub async fn api_info(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.metadata.info(&item_id).await?))
}

pub async fn api_trending(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.metadata.trending().await?))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
