//! 应用状态

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// 全局 shutdown token，用于优雅关闭
static GLOBAL_SHUTDOWN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

/// 获取全局 shutdown token
pub fn get_shutdown_token() -> CancellationToken {
    GLOBAL_SHUTDOWN
        .get_or_init(CancellationToken::new)
        .clone()
}

/// 触发全局 shutdown
pub fn trigger_shutdown() {
    if let Some(token) = GLOBAL_SHUTDOWN.get() {
        token.cancel();
    }
}

use crate::config::env::EnvConfig;
use crate::domain::deploy::{DeploymentRequest, Framework};
use crate::infra::{CommandRunner, HealthProbe, HttpProbe, ProcessRunner};
use crate::services::deploy::DeploySettings;
use crate::services::{ContainerManager, Orchestrator, Scanner};

/// 运行中的部署
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningDeploy {
    pub id: String,
    pub framework: Framework,
    pub model_id: String,
    pub started_at: DateTime<Utc>,
}

/// 应用状态
pub struct AppState {
    /// 环境配置
    pub config: EnvConfig,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,
    /// 部署编排器（内含容器管理器）
    pub orchestrator: Orchestrator,
    /// 能力扫描器
    pub scanner: Scanner,
    /// 对话透传使用的 HTTP 客户端（无整体超时，响应为流）
    pub http: reqwest::Client,
    /// 当前运行中的部署，同一时间至多一个
    pub running_deploy: RwLock<Option<RunningDeploy>>,
}

impl AppState {
    /// 从环境变量创建应用状态
    pub fn new() -> Result<Self, reqwest::Error> {
        let config = EnvConfig::from_env();

        tracing::info!(
            port = config.port,
            docker = %config.docker_bin,
            network = %config.network,
            hf_cache = %config.hf_cache.display(),
            webui_port = config.webui_port,
            command_timeout_secs = config.command_timeout.as_secs(),
            "Loaded configuration"
        );

        let probe = HttpProbe::new()?;
        let http = reqwest::Client::builder().build()?;

        Ok(Self::with_components(
            config,
            Arc::new(CommandRunner::new()),
            Arc::new(probe),
            http,
        ))
    }

    /// 使用指定的执行器与探测器创建（测试注入假实现）
    pub fn with_components(
        config: EnvConfig,
        runner: Arc<dyn ProcessRunner>,
        probe: Arc<dyn HealthProbe>,
        http: reqwest::Client,
    ) -> Self {
        let containers = ContainerManager::new(runner.clone(), probe, &config);
        let orchestrator = Orchestrator::new(containers, DeploySettings::from_config(&config));
        let scanner = Scanner::new(runner, &config);

        Self {
            config,
            started_at: Utc::now(),
            orchestrator,
            scanner,
            http,
            running_deploy: RwLock::new(None),
        }
    }

    /// 容器管理器
    pub fn containers(&self) -> &ContainerManager {
        self.orchestrator.containers()
    }

    /// 占用部署槽位，成功返回部署 ID；已有部署时返回该部署
    pub async fn try_register_deploy(
        &self,
        request: &DeploymentRequest,
    ) -> Result<String, RunningDeploy> {
        let mut running = self.running_deploy.write().await;
        if let Some(existing) = running.as_ref() {
            return Err(existing.clone());
        }

        let id = uuid::Uuid::new_v4().to_string();
        *running = Some(RunningDeploy {
            id: id.clone(),
            framework: request.framework,
            model_id: request.model_id.clone(),
            started_at: Utc::now(),
        });
        Ok(id)
    }

    /// 释放部署槽位（只释放自己占用的）
    pub async fn unregister_deploy(&self, id: &str) {
        let mut running = self.running_deploy.write().await;
        if running.as_ref().is_some_and(|d| d.id == id) {
            *running = None;
        }
    }

    /// 当前运行中的部署
    pub async fn current_deploy(&self) -> Option<RunningDeploy> {
        self.running_deploy.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::fake::{FakeProbe, FakeRunner};

    fn state() -> AppState {
        AppState::with_components(
            EnvConfig::default(),
            Arc::new(FakeRunner::new()),
            Arc::new(FakeProbe::healthy()),
            reqwest::Client::new(),
        )
    }

    fn request() -> DeploymentRequest {
        DeploymentRequest {
            framework: Framework::Ollama,
            model_id: "gemma3:1b".to_string(),
            port: None,
            gpu_enabled: false,
            max_context_length: None,
            quantization: None,
            guardrail_prompt: None,
        }
    }

    #[tokio::test]
    async fn test_single_deploy_slot() {
        let state = state();

        let id = state.try_register_deploy(&request()).await.unwrap();
        let busy = state.try_register_deploy(&request()).await.unwrap_err();
        assert_eq!(busy.id, id);
        assert_eq!(busy.model_id, "gemma3:1b");

        // 其他 ID 不能释放槽位
        state.unregister_deploy("someone-else").await;
        assert!(state.current_deploy().await.is_some());

        state.unregister_deploy(&id).await;
        assert!(state.current_deploy().await.is_none());
        assert!(state.try_register_deploy(&request()).await.is_ok());
    }
}
