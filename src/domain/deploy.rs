//! 部署相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::container::ContainerRole;

/// 推理框架
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Vllm,
    Ollama,
}

impl Framework {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Vllm => "vllm",
            Framework::Ollama => "ollama",
        }
    }

    /// 解析框架名称，未知值返回 None
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vllm" => Some(Framework::Vllm),
            "ollama" => Some(Framework::Ollama),
            _ => None,
        }
    }

    /// 对应的推理容器角色
    pub fn role(&self) -> ContainerRole {
        match self {
            Framework::Vllm => ContainerRole::InferenceVllm,
            Framework::Ollama => ContainerRole::InferenceOllama,
        }
    }
}

/// 请求校验错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("framework is required")]
    MissingFramework,

    #[error("unsupported framework '{0}' (expected 'vllm' or 'ollama')")]
    UnsupportedFramework(String),

    #[error("modelId is required")]
    MissingModelId,

    #[error("port must be a positive integer")]
    InvalidPort,

    #[error("maxContextLength must be a positive integer")]
    InvalidContextLength,

    #[error("guardrailPrompt must not contain '\"\"\"'")]
    GuardrailDelimiter,
}

/// Modelfile 中 SYSTEM 块的定界符
pub const MODELFILE_DELIMITER: &str = "\"\"\"";

/// 部署请求（HTTP body 原始形态）
///
/// 所有字段可缺省，经 [`DeployRequestBody::validate`] 转为 [`DeploymentRequest`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequestBody {
    pub framework: Option<String>,
    pub model_id: Option<String>,
    pub port: Option<u16>,
    pub gpu_enabled: Option<bool>,
    #[serde(alias = "maxModelLen")]
    pub max_context_length: Option<u32>,
    pub quantization: Option<String>,
    pub guardrail_prompt: Option<String>,
}

impl DeployRequestBody {
    /// 校验并规范化请求
    ///
    /// `gpu_default` 用于 body 未给出 `gpuEnabled` 的情况
    pub fn validate(self, gpu_default: bool) -> Result<DeploymentRequest, ValidationError> {
        let framework = match self.framework.as_deref().map(str::trim) {
            None | Some("") => return Err(ValidationError::MissingFramework),
            Some(raw) => Framework::parse(raw)
                .ok_or_else(|| ValidationError::UnsupportedFramework(raw.to_string()))?,
        };

        let model_id = non_blank(self.model_id).ok_or(ValidationError::MissingModelId)?;

        if self.port == Some(0) {
            return Err(ValidationError::InvalidPort);
        }
        if self.max_context_length == Some(0) {
            return Err(ValidationError::InvalidContextLength);
        }

        // Ollama 把提示词写进 Modelfile 的 SYSTEM """...""" 块
        let guardrail_prompt = non_blank(self.guardrail_prompt);
        if framework == Framework::Ollama
            && guardrail_prompt
                .as_deref()
                .is_some_and(|p| p.contains(MODELFILE_DELIMITER))
        {
            return Err(ValidationError::GuardrailDelimiter);
        }

        // "none" 是前端推荐流程的占位值
        let quantization =
            non_blank(self.quantization).filter(|q| !q.eq_ignore_ascii_case("none"));

        Ok(DeploymentRequest {
            framework,
            model_id,
            port: self.port,
            gpu_enabled: self.gpu_enabled.unwrap_or(gpu_default),
            max_context_length: self.max_context_length,
            quantization,
            guardrail_prompt,
        })
    }

    /// body 是否显式给出了 GPU 开关
    pub fn has_gpu_flag(&self) -> bool {
        self.gpu_enabled.is_some()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 已校验的部署请求，提交后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub framework: Framework,
    pub model_id: String,
    pub port: Option<u16>,
    pub gpu_enabled: bool,
    pub max_context_length: Option<u32>,
    pub quantization: Option<String>,
    pub guardrail_prompt: Option<String>,
}

impl DeploymentRequest {
    /// 推理服务对外端口
    pub fn host_port(&self) -> u16 {
        self.port
            .unwrap_or_else(|| self.framework.role().default_host_port())
    }
}

/// 部署步骤标识
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeployStep {
    Network,
    Cleanup,
    Pull,
    Start,
    Health,
    Model,
    Guardrails,
    Ready,
    WebuiCleanup,
    WebuiPull,
    WebuiStart,
    WebuiHealth,
    WebuiReady,
    Complete,
    Error,
}

impl DeployStep {
    /// 转换为字符串（即 SSE 事件中的 `step`）
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStep::Network => "network",
            DeployStep::Cleanup => "cleanup",
            DeployStep::Pull => "pull",
            DeployStep::Start => "start",
            DeployStep::Health => "health",
            DeployStep::Model => "model",
            DeployStep::Guardrails => "guardrails",
            DeployStep::Ready => "ready",
            DeployStep::WebuiCleanup => "webui-cleanup",
            DeployStep::WebuiPull => "webui-pull",
            DeployStep::WebuiStart => "webui-start",
            DeployStep::WebuiHealth => "webui-health",
            DeployStep::WebuiReady => "webui-ready",
            DeployStep::Complete => "complete",
            DeployStep::Error => "error",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployStep::Complete | DeployStep::Error)
    }
}

/// 进度事件
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressEvent {
    pub step: String,
    pub message: String,
    /// Unix 毫秒时间戳
    pub timestamp: i64,
}

impl ProgressEvent {
    /// 创建新事件
    pub fn new(step: DeployStep, message: impl Into<String>) -> Self {
        Self {
            step: step.as_str().to_string(),
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// 是否为终态事件
    pub fn is_terminal(&self) -> bool {
        self.step == DeployStep::Complete.as_str() || self.step == DeployStep::Error.as_str()
    }
}

/// 推理服务就绪后的访问信息
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InferenceEndpoint {
    /// 外部访问地址 `http://localhost:<port>`
    pub url: String,
    /// 对话流量应使用的模型名
    pub model: String,
}

/// 部署完成后的整套服务地址（不持久化，由调用方保存）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeployedStack {
    pub model_url: String,
    pub webui_url: String,
    pub model: String,
}

/// 外部命令的输出行
#[derive(Clone, Debug, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: String, // stdout | stderr
    pub content: String,
}

impl LogLine {
    /// 创建新日志行
    pub fn new(stream: &str, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream: stream.to_string(),
            content: content.into(),
        }
    }

    /// 创建 stdout 日志行
    pub fn stdout(content: impl Into<String>) -> Self {
        Self::new("stdout", content)
    }

    /// 创建 stderr 日志行
    pub fn stderr(content: impl Into<String>) -> Self {
        Self::new("stderr", content)
    }
}
