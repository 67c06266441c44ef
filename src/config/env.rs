//! 环境变量配置加载

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 服务监听端口
    pub port: u16,
    /// docker 可执行文件
    pub docker_bin: String,
    /// 共享 Docker 网络名称
    pub network: String,
    /// HuggingFace 权重缓存目录（挂载进 vLLM 容器）
    pub hf_cache: PathBuf,
    /// Open WebUI 对外端口
    pub webui_port: u16,
    /// 单条外部命令的超时
    pub command_timeout: Duration,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        // Port - 支持 LLMFA_PORT 作为 fallback
        let port = load_with_fallback("PORT", "LLMFA_PORT")
            .and_then(|v| parse_or_warn("PORT", &v))
            .unwrap_or(3000);

        let docker_bin = env::var("LLMFA_DOCKER_BIN").unwrap_or_else(|_| "docker".to_string());

        let network = env::var("LLMFA_NETWORK")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| constants::DEFAULT_NETWORK.to_string());

        let hf_cache = env::var("LLMFA_HF_CACHE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_hf_cache);

        let webui_port = env::var("LLMFA_WEBUI_PORT")
            .ok()
            .and_then(|v| parse_or_warn("LLMFA_WEBUI_PORT", &v))
            .unwrap_or(constants::DEFAULT_WEBUI_PORT);

        let command_timeout_secs = env::var("LLMFA_COMMAND_TIMEOUT_SECS")
            .ok()
            .and_then(|v| parse_or_warn("LLMFA_COMMAND_TIMEOUT_SECS", &v))
            .unwrap_or(constants::COMMAND_TIMEOUT_SECS);

        Self {
            port,
            docker_bin,
            network,
            hf_cache,
            webui_port,
            command_timeout: Duration::from_secs(command_timeout_secs),
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            docker_bin: "docker".to_string(),
            network: constants::DEFAULT_NETWORK.to_string(),
            hf_cache: default_hf_cache(),
            webui_port: constants::DEFAULT_WEBUI_PORT,
            command_timeout: Duration::from_secs(constants::COMMAND_TIMEOUT_SECS),
        }
    }
}

/// `~/.cache/huggingface`，无法解析 home 目录时退回相对路径
fn default_hf_cache() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".cache").join("huggingface"))
        .unwrap_or_else(|| PathBuf::from(".cache/huggingface"))
}

/// 加载环境变量，支持 fallback
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value, "Ignoring unparsable environment variable");
            None
        }
    }
}

/// 常量
pub mod constants {
    /// 共享网络默认名称
    pub const DEFAULT_NETWORK: &str = "llmforall-net";

    /// Open WebUI 默认对外端口
    pub const DEFAULT_WEBUI_PORT: u16 = 3001;

    /// 外部命令默认超时（秒）
    pub const COMMAND_TIMEOUT_SECS: u64 = 1800; // 30 分钟

    /// 探测类命令（docker ps / nvidia-smi 等）超时（秒）
    pub const QUERY_TIMEOUT_SECS: u64 = 10;

    /// 单条命令 stdout 捕获上限
    pub const MAX_OUTPUT_BYTES: usize = 50 * 1024 * 1024;

    /// 进度事件通道容量
    pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

    /// SSE keep-alive 间隔（秒）
    pub const SSE_KEEPALIVE_SECS: u64 = 15;

    /// 单次就绪探测 HTTP 超时（秒）
    pub const PROBE_TIMEOUT_SECS: u64 = 5;

    /// vLLM 就绪探测：次数 / 间隔（秒），首次加载权重较慢
    pub const VLLM_HEALTH_ATTEMPTS: u32 = 120;
    pub const VLLM_HEALTH_INTERVAL_SECS: u64 = 5;

    /// Ollama 就绪探测
    pub const OLLAMA_HEALTH_ATTEMPTS: u32 = 30;
    pub const OLLAMA_HEALTH_INTERVAL_SECS: u64 = 3;

    /// Open WebUI 就绪探测
    pub const WEBUI_HEALTH_ATTEMPTS: u32 = 60;
    pub const WEBUI_HEALTH_INTERVAL_SECS: u64 = 3;

    /// 未指定时的最大上下文长度
    pub const DEFAULT_CONTEXT_LENGTH: u32 = 8192;

    /// 带 guardrail 的派生模型名
    pub const GUARDRAIL_MODEL_NAME: &str = "llmfa-custom";

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
