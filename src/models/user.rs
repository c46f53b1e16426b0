use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户
///
/// 身份由上游网关通过请求头传入，首次出现时自动建档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub level: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 用户资料更新
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub name: Option<String>,
    pub level: Option<String>,
}
