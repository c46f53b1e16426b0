use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use tracing::warn;

use super::error::{HttpError, HttpResult};
use super::state::AppState;
use crate::workflow::chat_flow::ndjson_lines;
use crate::workflow::ChatRequest;

/// POST /api/chat
///
/// 以 NDJSON 流式返回模型回复，每行 `{"chunk": "..."}`
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> HttpResult<Response> {
    if request.message.trim().is_empty() {
        return Err(HttpError::bad_request("Message is required"));
    }

    let deltas = state
        .chat
        .run(&request)
        .await
        .map_err(|e| HttpError::internal("Internal Server Error", e))?;

    let lines = ndjson_lines(deltas).inspect(|line| {
        if let Err(e) = line {
            warn!("⚠️ 流式输出中断: {:#}", e);
        }
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}
