//! LLMfA Agent - 本地 LLM 推理栈部署代理
//!
//! 通过 docker 部署推理服务（vLLM / Ollama）与 Open WebUI，
//! 以 SSE 推送部署进度

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;
pub mod state;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::env::constants::VERSION;
use crate::state::app_state::{get_shutdown_token, trigger_shutdown};
use crate::state::AppState;

/// 默认日志过滤
const DEFAULT_LOG_FILTER: &str = "llmfa_agent=info,tower_http=info";

/// 命令行运行参数
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// 覆盖环境变量中的监听端口
    pub port_override: Option<u16>,
}

/// 初始化日志并运行 HTTP 服务，直到收到 Ctrl+C / SIGTERM
pub async fn init_and_run_agent_with_config(runtime: RuntimeConfig) -> anyhow::Result<()> {
    init_tracing();

    let state = Arc::new(AppState::new().context("Failed to initialise HTTP clients")?);
    let port = runtime.port_override.unwrap_or(state.config.port);

    info!(version = VERSION, port, "LLMfA agent starting");

    let app = api::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(%addr, "Listening");

    tokio::spawn(wait_for_signal());

    let shutdown = get_shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server error")?;

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // 重复初始化（如嵌入调用方已设置 subscriber）时忽略
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 等待退出信号并触发全局 shutdown
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    trigger_shutdown();
}
