//! 对外错误响应

use crate::tag_store::TagError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 参数缺失或越界
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Tag(#[from] TagError),
    /// 中转接口的所有代理服务都失败
    #[error("所有代理服务都失败")]
    RelayExhausted {
        target_url: String,
        details: String,
        tried: Vec<String>,
    },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Tag(TagError::AlreadyExists(_)) => StatusCode::CONFLICT,
            ApiError::Tag(TagError::Protected(_)) => StatusCode::FORBIDDEN,
            ApiError::Tag(TagError::Empty) => StatusCode::BAD_REQUEST,
            ApiError::Tag(TagError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::RelayExhausted { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::RelayExhausted {
                target_url,
                details,
                tried,
            } => json!({
                "error": self.to_string(),
                "details": details,
                "targetUrl": target_url,
                "triedServices": tried,
            }),
            ApiError::Tag(TagError::AlreadyExists(tag)) => json!({
                "error": self.to_string(),
                "tag": tag,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(TagError::AlreadyExists("热门".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(TagError::Protected("热门".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::RelayExhausted {
                target_url: String::new(),
                details: String::new(),
                tried: vec![],
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
