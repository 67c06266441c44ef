//! 容器相关领域模型

use serde::Serialize;

use super::deploy::Framework;

/// 容器角色
///
/// 每个角色同一时间只存在一个实例，名称固定
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerRole {
    InferenceVllm,
    InferenceOllama,
    Webui,
}

impl ContainerRole {
    /// 容器名，只取决于角色
    pub fn container_name(&self) -> &'static str {
        match self {
            ContainerRole::InferenceVllm => "llmfa-vllm",
            ContainerRole::InferenceOllama => "llmfa-ollama",
            ContainerRole::Webui => "llmfa-webui",
        }
    }

    /// 镜像引用
    pub fn image(&self) -> &'static str {
        match self {
            ContainerRole::InferenceVllm => "vllm/vllm-openai:latest",
            ContainerRole::InferenceOllama => "ollama/ollama:latest",
            ContainerRole::Webui => "ghcr.io/open-webui/open-webui:main",
        }
    }

    /// 容器内监听端口
    pub fn internal_port(&self) -> u16 {
        match self {
            ContainerRole::InferenceVllm => 8000,
            ContainerRole::InferenceOllama => 11434,
            ContainerRole::Webui => 8080,
        }
    }

    /// 默认对外端口
    pub fn default_host_port(&self) -> u16 {
        match self {
            ContainerRole::InferenceVllm => 8000,
            ContainerRole::InferenceOllama => 11434,
            ContainerRole::Webui => 3001,
        }
    }

    /// 面向用户的服务名
    pub fn service_name(&self) -> &'static str {
        match self {
            ContainerRole::InferenceVllm => "vLLM",
            ContainerRole::InferenceOllama => "Ollama",
            ContainerRole::Webui => "Open WebUI",
        }
    }

    /// 共享网络内的访问地址（容器间通信使用）
    pub fn internal_url(&self) -> String {
        format!("http://{}:{}", self.container_name(), self.internal_port())
    }

    /// 推理角色对应的框架
    pub fn framework(&self) -> Option<Framework> {
        match self {
            ContainerRole::InferenceVllm => Some(Framework::Vllm),
            ContainerRole::InferenceOllama => Some(Framework::Ollama),
            ContainerRole::Webui => None,
        }
    }
}

/// 端口映射 host -> container
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

/// 受管容器的启动描述
///
/// 通过 [`ContainerSpec::run_args`] 生成 `docker run -d ...` 参数
#[derive(Clone, Debug)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<String>,
    pub env: Vec<(String, String)>,
    pub gpus: bool,
    pub extra_flags: Vec<String>,
    /// 镜像名之后的参数
    pub command: Vec<String>,
}

impl ContainerSpec {
    /// 按角色创建，名称与镜像由角色决定
    pub fn for_role(role: ContainerRole, network: &str) -> Self {
        Self {
            name: role.container_name().to_string(),
            image: role.image().to_string(),
            network: network.to_string(),
            ports: Vec::new(),
            volumes: Vec::new(),
            env: Vec::new(),
            gpus: false,
            extra_flags: Vec::new(),
            command: Vec::new(),
        }
    }

    pub fn publish(mut self, host: u16, container: u16) -> Self {
        self.ports.push(PortMapping { host, container });
        self
    }

    pub fn volume(mut self, mount: impl Into<String>) -> Self {
        self.volumes.push(mount.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn gpus(mut self, enabled: bool) -> Self {
        self.gpus = enabled;
        self
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.extra_flags.push(flag.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.push(arg.into());
        self
    }

    /// `docker run` 的参数（不含 docker 本身）
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--network".to_string(),
            self.network.clone(),
        ];

        if self.gpus {
            args.push("--gpus".to_string());
            args.push("all".to_string());
        }

        for volume in &self.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }

        for port in &self.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", port.host, port.container));
        }

        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.extend(self.extra_flags.iter().cloned());
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// 推理服务状态
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ModelServerStatus {
    pub running: bool,
    pub url: Option<String>,
    pub framework: Option<Framework>,
}

/// WebUI 状态
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebUiStatus {
    pub running: bool,
    pub url: Option<String>,
}

/// 状态查询响应
#[derive(Debug, Serialize)]
pub struct ServiceStatusResponse {
    #[serde(rename = "modelServer")]
    pub model_server: ModelServerStatus,
    #[serde(rename = "openWebUI")]
    pub open_web_ui: WebUiStatus,
}
