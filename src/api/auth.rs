use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

use super::error::HttpError;
use super::state::AppState;
use crate::models::User;

/// 上游网关写入的用户邮箱请求头
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// 当前用户
///
/// 从 `x-user-email` 读取身份，首次出现时自动建档；缺失时返回 401
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(USER_EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(HttpError::Unauthorized)?;

        let user = state
            .users
            .ensure(email)
            .await
            .map_err(|e| HttpError::internal("Failed to load user", e))?;
        debug!("🔍 当前用户 {} ({})", user.email, user.id);

        Ok(CurrentUser(user))
    }
}
