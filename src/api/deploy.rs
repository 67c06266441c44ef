//! 部署管理 API
//!
//! 包含 /api/deploy（SSE 进度流）与 /api/status 端点

use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tracing::{info, info_span, Instrument};

use crate::config::env::constants::{PROGRESS_CHANNEL_CAPACITY, SSE_KEEPALIVE_SECS};
use crate::domain::container::{ContainerRole, ModelServerStatus, ServiceStatusResponse, WebUiStatus};
use crate::domain::deploy::DeployRequestBody;
use crate::error::{ApiError, ApiResult};
use crate::services::{ContainerManager, ProgressEmitter};
use crate::state::AppState;

/// 创建部署路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/deploy", post(deploy))
        .route("/api/status", get(status))
}

/// 发起部署，以 SSE 返回进度
///
/// POST /api/deploy
///
/// 请求无效返回 400，已有部署进行中返回 409，二者都不会触发容器操作。
/// 调用方断开连接不会取消部署
async fn deploy(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DeployRequestBody>, JsonRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let gpu_requested = body.has_gpu_flag();
    let mut request = state.orchestrator.validate(body, false)?;

    let deploy_id = state
        .try_register_deploy(&request)
        .await
        .map_err(|running| {
            ApiError::conflict(format!(
                "A deployment of {} ({}) is already in progress",
                running.model_id,
                running.framework.as_str()
            ))
        })?;

    if !gpu_requested {
        let gpu = state.scanner.detect_gpu().await;
        request.gpu_enabled = gpu.supports_docker_gpus();
        info!(gpu = %gpu.model, enabled = request.gpu_enabled, "GPU flag derived from host scan");
    }

    let (emitter, mut rx) = ProgressEmitter::channel(PROGRESS_CHANNEL_CAPACITY);

    let span = info_span!(
        "deploy",
        id = %deploy_id,
        framework = request.framework.as_str(),
        model_id = %request.model_id
    );
    let task_state = state.clone();
    tokio::spawn(
        async move {
            task_state.orchestrator.run(request, emitter).await;
            task_state.unregister_deploy(&deploy_id).await;
        }
        .instrument(span),
    );

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            let json = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(json));
            if terminal {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEPALIVE_SECS))
            .text("keepalive"),
    ))
}

/// 查询服务运行状态（每次实时探测，不缓存）
///
/// GET /api/status
async fn status(State(state): State<Arc<AppState>>) -> Json<ServiceStatusResponse> {
    let containers = state.containers();

    let (vllm, ollama, webui) = tokio::join!(
        containers.is_running(ContainerRole::InferenceVllm.container_name()),
        containers.is_running(ContainerRole::InferenceOllama.container_name()),
        containers.is_running(ContainerRole::Webui.container_name()),
    );

    let active = if vllm {
        Some(ContainerRole::InferenceVllm)
    } else if ollama {
        Some(ContainerRole::InferenceOllama)
    } else {
        None
    };

    let model_url = match active {
        Some(role) => Some(external_url(containers, role, role.default_host_port()).await),
        None => None,
    };
    let webui_url = if webui {
        Some(external_url(containers, ContainerRole::Webui, state.config.webui_port).await)
    } else {
        None
    };

    Json(ServiceStatusResponse {
        model_server: ModelServerStatus {
            running: active.is_some(),
            url: model_url,
            framework: active.and_then(|role| role.framework()),
        },
        open_web_ui: WebUiStatus {
            running: webui,
            url: webui_url,
        },
    })
}

/// 实际发布的 host 端口，查询失败时使用默认值
async fn external_url(containers: &ContainerManager, role: ContainerRole, fallback: u16) -> String {
    let port = containers
        .published_port(role.container_name(), role.internal_port())
        .await
        .unwrap_or(fallback);
    format!("http://localhost:{}", port)
}
