use std::sync::Arc;

use axum::{extract::State, Json};

use super::error::{HttpError, HttpResult};
use super::state::AppState;
use crate::services::{SearchRequest, SearchResponse};

/// POST /api/search
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> HttpResult<Json<SearchResponse>> {
    if request.query.trim().is_empty() {
        return Err(HttpError::bad_request("Query is required"));
    }

    let response = state
        .search
        .search(&request)
        .await
        .map_err(|e| HttpError::internal_with_details("Failed to search documents", e))?;
    Ok(Json(response))
}

/// GET /api/search，存活探针
pub async fn hello_handler() -> &'static str {
    "Hello, world!"
}
