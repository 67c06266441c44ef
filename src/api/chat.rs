//! 对话透传 API
//!
//! 包含 /api/chat 端点：转发到已部署模型服务的 OpenAI 兼容接口，
//! 响应以流的形式原样返回

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::header,
    response::Response,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// 对话请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<Value>,
    pub model_url: Option<String>,
    pub guardrail_prompt: Option<String>,
    pub model: Option<String>,
}

impl ChatRequest {
    /// 上游 `/v1/chat/completions` 请求体
    pub fn upstream_body(&self) -> Value {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = self
            .guardrail_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            messages.push(json!({ "role": "system", "content": prompt }));
        }
        messages.extend(self.messages.iter().cloned());

        json!({
            "model": self.model.as_deref().filter(|m| !m.is_empty()).unwrap_or("default"),
            "messages": messages,
            "stream": true,
        })
    }
}

/// 创建对话路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/chat", post(chat))
}

/// 转发对话请求
///
/// POST /api/chat
async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let model_url = request
        .model_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("No model URL provided"))?;
    let url = format!("{}/v1/chat/completions", model_url.trim_end_matches('/'));

    debug!(url = %url, messages = request.messages.len(), "Forwarding chat request");

    let response = state
        .http
        .post(&url)
        .json(&request.upstream_body())
        .send()
        .await
        .map_err(|e| {
            warn!(url = %url, error = %e, "Model server unreachable");
            ApiError::BadGateway {
                message: format!("Failed to reach model server at {}", model_url),
                details: e.to_string(),
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        warn!(url = %url, status = %status, "Model server rejected chat request");
        return Err(ApiError::Upstream { status, message });
    }

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|e| ApiError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_body_prepends_guardrail() {
        let request = ChatRequest {
            messages: vec![json!({ "role": "user", "content": "hi" })],
            model_url: Some("http://localhost:11434".to_string()),
            guardrail_prompt: Some("No medical advice.".to_string()),
            model: Some("llmfa-custom".to_string()),
        };

        let body = request.upstream_body();
        assert_eq!(body["model"], "llmfa-custom");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "No medical advice.");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_upstream_body_defaults() {
        let request = ChatRequest {
            messages: vec![json!({ "role": "user", "content": "hi" })],
            model_url: None,
            guardrail_prompt: Some("  ".to_string()),
            model: None,
        };

        let body = request.upstream_body();
        assert_eq!(body["model"], "default");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }
}
