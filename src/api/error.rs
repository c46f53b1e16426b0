use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// HTTP 层错误，响应体统一为 `{"error": "..."}`
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// `details` 仅在需要向调用方暴露原因时填写
    #[error("{message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

impl HttpError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        HttpError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HttpError::NotFound(message.into())
    }

    /// 记录原始错误，只向外返回固定文案
    pub fn internal(message: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        let message = message.into();
        error!("❌ {}: {:#}", message, cause);
        HttpError::Internal {
            message,
            details: None,
        }
    }

    /// 同 `internal`，但把错误原因放进 `details`
    pub fn internal_with_details(message: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        let message = message.into();
        let details = format!("{:#}", cause);
        error!("❌ {}: {}", message, details);
        HttpError::Internal {
            message,
            details: Some(details),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::Unauthorized => StatusCode::UNAUTHORIZED,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::Conflict(_) => StatusCode::CONFLICT,
            HttpError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            HttpError::Internal {
                details: Some(details),
                ..
            } => json!({ "error": self.to_string(), "details": details }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

pub type HttpResult<T> = Result<T, HttpError>;
