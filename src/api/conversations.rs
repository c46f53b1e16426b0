//! 聊天会话的保存、列表与删除，只对当前用户自己的会话生效

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::auth::CurrentUser;
use super::error::{HttpError, HttpResult};
use super::state::AppState;
use crate::models::{Conversation, ConversationInput};

const DEFAULT_LIMIT: u32 = 10;
const DEFAULT_MESSAGE_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListQuery {
    pub user_id: Option<String>,
    pub limit: Option<u32>,
    pub message_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeleteQuery {
    pub id: Option<String>,
}

/// GET /api/conversations?limit=&messageLimit=
///
/// 带 `userId` 时必须是当前用户自己
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> HttpResult<impl IntoResponse> {
    if query.user_id.as_deref().is_some_and(|id| id != user.id) {
        return Err(HttpError::Unauthorized);
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let message_limit = query.message_limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);
    let conversations = state
        .conversations
        .list_for_user(&user.id, limit, message_limit)
        .await
        .map_err(|e| HttpError::internal("Internal server error", e))?;

    Ok((
        [(header::CACHE_CONTROL, "private, max-age=30, stale-while-revalidate=60")],
        Json(json!({ "conversations": conversations })),
    ))
}

/// POST /api/conversations
///
/// 带 `id` 时替换已有会话的消息（消息不能为空），否则新建
pub async fn save_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<ConversationInput>,
) -> HttpResult<Json<Conversation>> {
    let saved = match input.id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => {
            if !input.has_messages() {
                return Err(HttpError::bad_request("Cannot update conversation with no messages"));
            }
            state
                .conversations
                .replace(id, &user.id, &input)
                .await
                .map_err(|e| HttpError::internal("Internal Server Error", e))?
                .ok_or(HttpError::Unauthorized)?
        }
        None => state
            .conversations
            .create(&user.id, &input)
            .await
            .map_err(|e| HttpError::internal("Internal Server Error", e))?,
    };

    info!("💬 会话已保存: {} ({} 条消息)", saved.id, saved.messages.len());
    Ok(Json(saved))
}

/// DELETE /api/conversations?id=
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<DeleteQuery>,
) -> HttpResult<Json<Value>> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| HttpError::bad_request("Conversation ID is required"))?;

    let deleted = state
        .conversations
        .delete(&id, &user.id)
        .await
        .map_err(|e| HttpError::internal("Internal server error", e))?;
    if !deleted {
        return Err(HttpError::Unauthorized);
    }
    Ok(Json(json!({ "success": true })))
}

/// POST /api/conversations/cleanup，删除仍是默认标题的空会话
pub async fn cleanup_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> HttpResult<Json<Value>> {
    let deleted = state
        .conversations
        .delete_untitled(&user.id)
        .await
        .map_err(|e| HttpError::internal("Internal server error", e))?;
    if deleted > 0 {
        info!("🧹 已清理用户 {} 的 {} 个未命名会话", user.email, deleted);
    }
    Ok(Json(json!({ "success": true, "deletedCount": deleted })))
}
