//! Webhook 接收服务错误类型定义
//!
//! 错误到 HTTP 状态码的映射即对店铺端的响应契约：
//! 请求形态问题 -> 400，认证问题 -> 403，基础设施故障 -> 500。
//! 下游注册失败不会出现在这里——那只反映在订单的持久化状态上。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use enroll_shared::error::EnrollError;
use serde_json::json;

/// Webhook 接收错误
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    // 请求形态错误
    #[error("缺少必需的请求头: {0}")]
    MissingHeader(&'static str),
    #[error("订单负载解析失败: {0}")]
    InvalidPayload(String),

    // 认证错误
    #[error("未知的集成标识: {0}")]
    UnknownIntegration(String),
    #[error("签名校验失败")]
    SignatureMismatch,
    #[error("店铺域名不匹配")]
    DomainMismatch,

    // 基础设施错误
    #[error(transparent)]
    Shared(#[from] EnrollError),
}

impl WebhookError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingHeader(_) | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,

            Self::UnknownIntegration(_) | Self::SignatureMismatch | Self::DomainMismatch => {
                StatusCode::FORBIDDEN
            }

            Self::Shared(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingHeader(_) => "MISSING_HEADER",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::UnknownIntegration(_) => "UNKNOWN_INTEGRATION",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::DomainMismatch => "DOMAIN_MISMATCH",
            Self::Shared(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 基础设施错误只返回通用提示，详细信息仅记录日志，防止信息泄露
        let message = match &self {
            Self::Shared(e) => {
                tracing::error!(error = %e, "Webhook 处理基础设施故障");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, WebhookError>;
