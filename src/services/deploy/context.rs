//! 部署上下文
//!
//! 进度事件发送器与部署器共用的设置

use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::EnvConfig;
use crate::domain::deploy::{DeployStep, DeployedStack, ProgressEvent};
use crate::services::lifecycle::ContainerManager;

/// 进度事件发送器
///
/// 单生产者，事件按发送顺序到达。`complete` / `fail` 消耗自身，
/// 终态事件之后无法再发送任何事件
pub struct ProgressEmitter {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressEmitter {
    /// 创建发送器与对应的接收端
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// 发送一条中间进度
    pub async fn progress(&self, step: DeployStep, message: impl Into<String>) {
        debug_assert!(!step.is_terminal(), "terminal events go through complete/fail");
        let event = ProgressEvent::new(step, message);
        info!(step = %event.step, "{}", event.message);
        self.send(event).await;
    }

    /// 发送 `complete`，message 为 JSON 编码的服务地址
    pub async fn complete(self, stack: &DeployedStack) {
        let message = match serde_json::to_string(stack) {
            Ok(json) => json,
            Err(e) => {
                // 纯字符串结构，实际不会失败
                warn!(error = %e, "Failed to encode deployed stack");
                format!(
                    "{{\"modelUrl\":\"{}\",\"webuiUrl\":\"{}\"}}",
                    stack.model_url, stack.webui_url
                )
            }
        };
        info!(model_url = %stack.model_url, webui_url = %stack.webui_url, "Deployment complete");
        self.send(ProgressEvent::new(DeployStep::Complete, message))
            .await;
    }

    /// 发送 `error`
    pub async fn fail(self, message: impl Into<String>) {
        let event = ProgressEvent::new(DeployStep::Error, message);
        warn!("Deployment failed: {}", event.message);
        self.send(event).await;
    }

    async fn send(&self, event: ProgressEvent) {
        // 调用方放弃读取时部署继续进行
        if self.tx.send(event).await.is_err() {
            debug!("Progress receiver dropped, event discarded");
        }
    }
}

/// 部署器使用的主机侧设置
#[derive(Clone, Debug)]
pub struct DeploySettings {
    /// HuggingFace 缓存目录
    pub hf_cache: PathBuf,
    /// Open WebUI 对外端口
    pub webui_port: u16,
}

impl DeploySettings {
    pub fn from_config(config: &EnvConfig) -> Self {
        Self {
            hf_cache: config.hf_cache.clone(),
            webui_port: config.webui_port,
        }
    }
}

/// 部署执行上下文
///
/// 单次部署期间各部署器共享的借用
#[derive(Clone, Copy)]
pub struct DeployContext<'a> {
    pub containers: &'a ContainerManager,
    pub settings: &'a DeploySettings,
    pub emitter: &'a ProgressEmitter,
}

impl DeployContext<'_> {
    /// 发送进度
    pub async fn progress(&self, step: DeployStep, message: impl Into<String>) {
        self.emitter.progress(step, message).await;
    }
}

/// 把接收端中已有的事件全部取出（测试辅助）
#[cfg(test)]
pub fn drain(rx: &mut mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
