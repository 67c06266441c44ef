//! 统一错误处理
//!
//! - `DeployError`：部署流程中的失败（命令失败 / 就绪超时 / 请求无效）
//! - `ApiError`：实现 `IntoResponse`，替代重复的 `(StatusCode, Json<ErrorResponse>)` 模式

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::deploy::ValidationError;
use crate::infra::ProcessError;

/// 部署失败
#[derive(Debug, Error)]
pub enum DeployError {
    /// 外部命令失败，原样透出 stderr
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// 容器已启动但在探测预算内未就绪
    #[error("{service} failed to start within timeout. Check `docker logs {container}` for details.")]
    HealthCheckTimeout {
        service: &'static str,
        container: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// API 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// 统一 API 错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 400 - 请求无效
    BadRequest(String),
    /// 409 - 冲突（已有部署在进行）
    Conflict(String),
    /// 500 - 内部错误
    Internal(String),
    /// 上游模型服务返回非 2xx，透传状态码
    Upstream { status: StatusCode, message: String },
    /// 502 - 无法连接上游
    BadGateway { message: String, details: String },
}

impl ApiError {
    /// 创建请求无效错误
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// 创建冲突错误
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP 状态码
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream { status, .. } => *status,
            ApiError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest(msg) => ErrorResponse::new("bad_request", msg),
            ApiError::Conflict(msg) => ErrorResponse::new("conflict", msg),
            ApiError::Internal(msg) => ErrorResponse::new("internal_error", msg),
            ApiError::Upstream { message, .. } => ErrorResponse::new("upstream_error", message),
            ApiError::BadGateway { message, details } => {
                ErrorResponse::new("bad_gateway", message).with_details(details)
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<DeployError> for ApiError {
    fn from(e: DeployError) -> Self {
        match e {
            DeployError::Validation(v) => v.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(m) => write!(f, "Bad request: {}", m),
            ApiError::Conflict(m) => write!(f, "Conflict: {}", m),
            ApiError::Internal(m) => write!(f, "Internal error: {}", m),
            ApiError::Upstream { status, message } => {
                write!(f, "Upstream error ({}): {}", status, message)
            }
            ApiError::BadGateway { message, details } => {
                write!(f, "Bad gateway: {} ({})", message, details)
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// 便捷类型别名
pub type ApiResult<T> = Result<T, ApiError>;
