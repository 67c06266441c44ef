//! HTTP 就绪探测
//!
//! 对容器暴露的端点发 GET，任何 2xx 视为就绪

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::trace;

use crate::config::env::constants::PROBE_TIMEOUT_SECS;

/// 就绪探测接口
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// 单次探测；连接失败、超时、非 2xx 均返回 false
    async fn is_ready(&self, url: &str) -> bool;
}

/// 基于 reqwest 的探测器，复用连接池
#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// 创建探测器
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .pool_max_idle_per_host(2)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn is_ready(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                trace!(url, status = %response.status(), "Probe response");
                response.status().is_success()
            }
            Err(e) => {
                trace!(url, error = %e, "Probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_probe_accepts_2xx_only() {
        let base = serve(
            Router::new()
                .route("/api/tags", get(|| async { "{\"models\":[]}" }))
                .route("/loading", get(|| async { StatusCode::SERVICE_UNAVAILABLE })),
        )
        .await;

        let probe = HttpProbe::new().unwrap();
        assert!(probe.is_ready(&format!("{}/api/tags", base)).await);
        assert!(!probe.is_ready(&format!("{}/loading", base)).await);
        assert!(!probe.is_ready(&format!("{}/missing", base)).await);
    }

    #[tokio::test]
    async fn test_probe_connection_refused_is_not_ready() {
        // 绑定后立即释放，端口上没有监听者
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = HttpProbe::new().unwrap();
        assert!(!probe.is_ready(&format!("http://127.0.0.1:{}/", port)).await);
    }
}
