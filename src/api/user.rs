use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::auth::CurrentUser;
use super::error::{HttpError, HttpResult};
use super::state::AppState;
use crate::models::UserUpdate;

/// GET /api/user
pub async fn profile_handler(CurrentUser(user): CurrentUser) -> Json<Value> {
    Json(json!({ "user": user }))
}

/// PUT /api/user，只更新提交了的字段
pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<UserUpdate>,
) -> HttpResult<Json<Value>> {
    let updated = state
        .users
        .update(&user.id, update)
        .await
        .map_err(|e| HttpError::internal("Internal server error", e))?
        .ok_or_else(|| HttpError::not_found("User not found"))?;

    Ok(Json(json!({ "success": true, "user": updated })))
}
