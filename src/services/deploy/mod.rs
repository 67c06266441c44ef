//! 部署服务模块
//!
//! 推理服务（vLLM / Ollama）与 Open WebUI 的部署流程，以及串联两者的编排器

pub mod context;
pub mod ollama;
pub mod open_webui;
pub mod vllm;

use std::time::Duration;
use tracing::{error, info, warn};

use crate::domain::container::ContainerRole;
use crate::domain::deploy::{
    DeployRequestBody, DeployedStack, DeploymentRequest, Framework, InferenceEndpoint,
};
use crate::error::DeployError;
use crate::services::lifecycle::ContainerManager;

pub use context::{DeployContext, DeploySettings, ProgressEmitter};

/// 部署编排器
///
/// 先部署推理服务，成功后再部署 WebUI；两者严格串行
#[derive(Clone)]
pub struct Orchestrator {
    containers: ContainerManager,
    settings: DeploySettings,
}

impl Orchestrator {
    pub fn new(containers: ContainerManager, settings: DeploySettings) -> Self {
        Self {
            containers,
            settings,
        }
    }

    /// 容器管理器
    pub fn containers(&self) -> &ContainerManager {
        &self.containers
    }

    /// 校验请求，失败时不触发任何容器操作
    pub fn validate(
        &self,
        body: DeployRequestBody,
        gpu_default: bool,
    ) -> Result<DeploymentRequest, DeployError> {
        body.validate(gpu_default).map_err(|e| {
            warn!(error = %e, "Rejected deployment request");
            DeployError::from(e)
        })
    }

    /// 执行部署，返回整套服务地址
    ///
    /// 只发送中间进度事件，终态事件由 [`Orchestrator::run`] 发送
    pub async fn deploy(
        &self,
        request: &DeploymentRequest,
        emitter: &ProgressEmitter,
    ) -> Result<DeployedStack, DeployError> {
        let ctx = DeployContext {
            containers: &self.containers,
            settings: &self.settings,
            emitter,
        };

        info!(
            framework = request.framework.as_str(),
            model_id = %request.model_id,
            gpu = request.gpu_enabled,
            "Starting deployment"
        );

        let endpoint = deploy_inference_server(ctx, request).await?;
        let webui_url = open_webui::deploy(ctx, request.framework).await?;

        Ok(DeployedStack {
            model_url: endpoint.url,
            webui_url,
            model: endpoint.model,
        })
    }

    /// 执行部署并发送唯一的终态事件
    ///
    /// 失败时已启动的容器保持原样，下次部署的 cleanup 会移除它们
    pub async fn run(
        &self,
        request: DeploymentRequest,
        emitter: ProgressEmitter,
    ) -> Option<DeployedStack> {
        match self.deploy(&request, &emitter).await {
            Ok(stack) => {
                emitter.complete(&stack).await;
                Some(stack)
            }
            Err(e) => {
                error!(
                    framework = request.framework.as_str(),
                    model_id = %request.model_id,
                    error = %e,
                    "Deployment failed"
                );
                emitter.fail(e.to_string()).await;
                None
            }
        }
    }
}

/// 按框架分派推理服务部署
pub async fn deploy_inference_server(
    ctx: DeployContext<'_>,
    request: &DeploymentRequest,
) -> Result<InferenceEndpoint, DeployError> {
    match request.framework {
        Framework::Vllm => vllm::deploy(ctx, request).await,
        Framework::Ollama => ollama::deploy(ctx, request).await,
    }
}

/// 轮询就绪，预算耗尽视为失败
pub(crate) async fn wait_until_ready(
    containers: &ContainerManager,
    role: ContainerRole,
    url: &str,
    max_attempts: u32,
    interval: Duration,
) -> Result<(), DeployError> {
    if containers.wait_for_healthy(url, max_attempts, interval).await {
        Ok(())
    } else {
        Err(DeployError::HealthCheckTimeout {
            service: role.service_name(),
            container: role.container_name().to_string(),
        })
    }
}
