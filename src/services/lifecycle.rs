//! 容器生命周期管理
//!
//! 在 ProcessRunner 之上提供幂等原语：
//! - 网络创建容忍 "already exists"
//! - 查询类操作出错一律视为不存在 / 未运行
//! - 删除容忍 "已停止 / 已删除"
//! - 就绪轮询有上限，耗尽时返回 false 而非报错

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::env::constants::QUERY_TIMEOUT_SECS;
use crate::config::EnvConfig;
use crate::domain::container::ContainerSpec;
use crate::domain::deploy::LogLine;
use crate::infra::{HealthProbe, ProcessError, ProcessRunner};

/// 删除容器时可以忽略的 docker 报错
const TOLERATED_REMOVAL_ERRORS: &[&str] = &[
    "No such container",
    "is not running",
    "removal of container",
];

/// 容器生命周期管理器
#[derive(Clone)]
pub struct ContainerManager {
    runner: Arc<dyn ProcessRunner>,
    probe: Arc<dyn HealthProbe>,
    docker: String,
    network: String,
    command_timeout: Duration,
    query_timeout: Duration,
}

impl ContainerManager {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        probe: Arc<dyn HealthProbe>,
        config: &EnvConfig,
    ) -> Self {
        Self {
            runner,
            probe,
            docker: config.docker_bin.clone(),
            network: config.network.clone(),
            command_timeout: config.command_timeout,
            query_timeout: Duration::from_secs(QUERY_TIMEOUT_SECS),
        }
    }

    /// 共享网络名称
    pub fn network(&self) -> &str {
        &self.network
    }

    async fn docker(&self, args: Vec<String>) -> Result<String, ProcessError> {
        self.runner
            .run(&self.docker, &args, self.command_timeout)
            .await
    }

    async fn query(&self, args: Vec<String>) -> Result<String, ProcessError> {
        self.runner.run(&self.docker, &args, self.query_timeout).await
    }

    /// 创建共享网络，已存在时视为成功
    pub async fn ensure_network(&self) -> Result<(), ProcessError> {
        match self
            .docker(strings(&["network", "create", &self.network]))
            .await
        {
            Ok(_) => {
                info!(network = %self.network, "Created docker network");
                Ok(())
            }
            Err(e) if e.output_contains("already exists") => {
                debug!(network = %self.network, "Docker network already exists");
                Ok(())
            }
            Err(e) => {
                warn!(network = %self.network, error = %e, "Failed to create docker network");
                Err(e)
            }
        }
    }

    /// 按精确名称查询容器是否存在（含已停止）
    pub async fn container_exists(&self, name: &str) -> bool {
        let filter = format!("name=^{}$", name);
        self.query(strings(&[
            "ps", "-a", "--filter", &filter, "--format", "{{.Names}}",
        ]))
        .await
        .map(|out| out.lines().any(|line| line.trim() == name))
        .unwrap_or(false)
    }

    /// 按精确名称查询容器是否在运行
    pub async fn is_running(&self, name: &str) -> bool {
        let filter = format!("name=^{}$", name);
        self.query(strings(&[
            "ps",
            "--filter",
            &filter,
            "--filter",
            "status=running",
            "--format",
            "{{.Names}}",
        ]))
        .await
        .map(|out| out.lines().any(|line| line.trim() == name))
        .unwrap_or(false)
    }

    /// 停止并删除容器，不存在时直接返回
    pub async fn remove_container(&self, name: &str) -> Result<(), ProcessError> {
        if !self.container_exists(name).await {
            debug!(container = %name, "Container absent, nothing to remove");
            return Ok(());
        }

        for action in ["stop", "rm"] {
            match self.docker(strings(&[action, name])).await {
                Ok(_) => {}
                Err(e) if is_tolerated_removal_error(&e) => {
                    debug!(container = %name, action, error = %e, "Ignoring removal error");
                }
                Err(e) => {
                    warn!(container = %name, action, error = %e, "Failed to remove container");
                    return Err(e);
                }
            }
        }

        info!(container = %name, "Removed container");
        Ok(())
    }

    /// 拉取镜像，输出逐行写入 debug 日志
    pub async fn pull_image(&self, image: &str) -> Result<(), ProcessError> {
        let (log_tx, mut log_rx) = mpsc::unbounded_channel::<LogLine>();

        let image_name = image.to_string();
        let forward = tokio::spawn(async move {
            while let Some(line) = log_rx.recv().await {
                debug!(image = %image_name, stream = %line.stream, "{}", line.content);
            }
        });

        let result = self
            .runner
            .stream_run(
                &self.docker,
                &strings(&["pull", image]),
                log_tx,
                self.command_timeout,
            )
            .await;
        let _ = forward.await;

        match result {
            Ok(_) => {
                info!(image, "Pulled image");
                Ok(())
            }
            Err(e) => {
                warn!(image, error = %e, "Failed to pull image");
                Err(e)
            }
        }
    }

    /// `docker run -d`，返回容器 ID
    pub async fn run_container(&self, spec: &ContainerSpec) -> Result<String, ProcessError> {
        let id = self.docker(spec.run_args()).await?;
        info!(container = %spec.name, image = %spec.image, id = %short_id(&id), "Started container");
        Ok(id)
    }

    /// 在运行中的容器内执行命令
    pub async fn exec(&self, name: &str, command: &[String]) -> Result<String, ProcessError> {
        let mut args = strings(&["exec", name]);
        args.extend(command.iter().cloned());
        self.docker(args).await
    }

    /// 查询容器内端口映射到的 host 端口
    pub async fn published_port(&self, name: &str, internal_port: u16) -> Option<u16> {
        let port_spec = format!("{}/tcp", internal_port);
        let out = self
            .query(strings(&["port", name, &port_spec]))
            .await
            .ok()?;
        parse_published_port(&out)
    }

    /// 轮询就绪探测
    ///
    /// 最多探测 `max_attempts` 次，两次之间等待 `interval`；耗尽返回 false
    pub async fn wait_for_healthy(&self, url: &str, max_attempts: u32, interval: Duration) -> bool {
        for attempt in 1..=max_attempts {
            if self.probe.is_ready(url).await {
                info!(url, attempt, "Service is healthy");
                return true;
            }
            debug!(url, attempt, max_attempts, "Service not ready yet");
            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        warn!(url, max_attempts, "Health check budget exhausted");
        false
    }
}

fn is_tolerated_removal_error(e: &ProcessError) -> bool {
    TOLERATED_REMOVAL_ERRORS
        .iter()
        .any(|needle| e.output_contains(needle))
}

/// 解析 `docker port` 输出，如 `0.0.0.0:8001` / `[::]:8001`
fn parse_published_port(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit(':').next())
        .find_map(|port| port.parse().ok())
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::container::ContainerRole;
    use crate::infra::fake::{FakeProbe, FakeRunner};

    fn manager(runner: Arc<FakeRunner>, probe: Arc<FakeProbe>) -> ContainerManager {
        ContainerManager::new(runner, probe, &EnvConfig::default())
    }

    #[tokio::test]
    async fn test_ensure_network_tolerates_existing() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail(
            "network create",
            "Error response from daemon: network with name llmforall-net already exists",
        );
        let containers = manager(runner.clone(), Arc::new(FakeProbe::healthy()));

        assert!(containers.ensure_network().await.is_ok());
        assert!(containers.ensure_network().await.is_ok());
        assert_eq!(
            runner.calls_matching("network create llmforall-net").len(),
            2
        );
    }

    #[tokio::test]
    async fn test_ensure_network_other_failure_is_fatal() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail(
            "network create",
            "permission denied while trying to connect to the Docker daemon socket",
        );
        let containers = manager(runner, Arc::new(FakeProbe::healthy()));

        let err = containers.ensure_network().await.unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_queries_treat_errors_as_absent() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail("ps", "Cannot connect to the Docker daemon");
        let containers = manager(runner, Arc::new(FakeProbe::healthy()));

        assert!(!containers.container_exists("llmfa-ollama").await);
        assert!(!containers.is_running("llmfa-ollama").await);
    }

    #[tokio::test]
    async fn test_queries_require_exact_name() {
        let runner = Arc::new(FakeRunner::new());
        runner.on("ps", "llmfa-ollama-old");
        let containers = manager(runner.clone(), Arc::new(FakeProbe::healthy()));
        assert!(!containers.is_running("llmfa-ollama").await);

        runner.on("status=running", "llmfa-ollama");
        assert!(containers.is_running("llmfa-ollama").await);
        assert_eq!(
            runner.calls().last().unwrap(),
            "docker ps --filter name=^llmfa-ollama$ --filter status=running --format {{.Names}}"
        );
    }

    #[tokio::test]
    async fn test_remove_absent_container_is_noop() {
        let runner = Arc::new(FakeRunner::new());
        let containers = manager(runner.clone(), Arc::new(FakeProbe::healthy()));

        containers.remove_container("llmfa-webui").await.unwrap();
        assert!(runner.calls_matching("stop").is_empty());
        assert!(runner.calls_matching("docker rm").is_empty());
    }

    #[tokio::test]
    async fn test_remove_then_create_twice_is_idempotent() {
        let runner = Arc::new(FakeRunner::new());
        runner
            .on("ps -a", "llmfa-webui")
            .fail("stop llmfa-webui", "Error response from daemon: No such container: llmfa-webui")
            .fail("rm llmfa-webui", "Error response from daemon: No such container: llmfa-webui")
            .fail("network create", "network with name llmforall-net already exists");
        let containers = manager(runner.clone(), Arc::new(FakeProbe::healthy()));

        for _ in 0..2 {
            containers.remove_container("llmfa-webui").await.unwrap();
            containers.ensure_network().await.unwrap();
        }
        assert_eq!(runner.calls_matching("docker stop llmfa-webui").len(), 2);
        assert_eq!(runner.calls_matching("docker rm llmfa-webui").len(), 2);
    }

    #[tokio::test]
    async fn test_remove_propagates_unexpected_errors() {
        let runner = Arc::new(FakeRunner::new());
        runner
            .on("ps -a", "llmfa-vllm")
            .fail("rm llmfa-vllm", "device or resource busy");
        let containers = manager(runner, Arc::new(FakeProbe::healthy()));

        let err = containers.remove_container("llmfa-vllm").await.unwrap_err();
        assert_eq!(err.to_string(), "device or resource busy");
    }

    #[tokio::test]
    async fn test_run_container_and_exec_argv() {
        let runner = Arc::new(FakeRunner::new());
        runner.on("run -d", "0123456789abcdef0123");
        let containers = manager(runner.clone(), Arc::new(FakeProbe::healthy()));

        let spec = ContainerSpec::for_role(ContainerRole::InferenceOllama, containers.network())
            .publish(11434, 11434);
        let id = containers.run_container(&spec).await.unwrap();
        assert_eq!(id, "0123456789abcdef0123");

        containers
            .exec("llmfa-ollama", &strings(&["ollama", "pull", "gemma3:1b"]))
            .await
            .unwrap();
        assert_eq!(
            runner.calls().last().unwrap(),
            "docker exec llmfa-ollama ollama pull gemma3:1b"
        );
    }

    #[tokio::test]
    async fn test_pull_image_forwards_output() {
        let runner = Arc::new(FakeRunner::new());
        runner.on("pull ollama/ollama", "latest: Pulling from ollama/ollama");
        let containers = manager(runner.clone(), Arc::new(FakeProbe::healthy()));

        containers.pull_image("ollama/ollama:latest").await.unwrap();
        assert_eq!(runner.calls(), vec!["docker pull ollama/ollama:latest"]);
    }

    #[tokio::test]
    async fn test_pull_image_failure_is_propagated() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail("pull", "manifest for vllm/vllm-openai:nope not found");
        let containers = manager(runner, Arc::new(FakeProbe::healthy()));

        let err = containers.pull_image("vllm/vllm-openai:nope").await.unwrap_err();
        assert!(err.to_string().contains("manifest"));
    }

    #[tokio::test]
    async fn test_published_port() {
        let runner = Arc::new(FakeRunner::new());
        runner.on("port llmfa-vllm 8000/tcp", "0.0.0.0:8001\n[::]:8001");
        let containers = manager(runner, Arc::new(FakeProbe::healthy()));

        assert_eq!(containers.published_port("llmfa-vllm", 8000).await, Some(8001));
        assert_eq!(containers.published_port("llmfa-webui", 8080).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_healthy_is_bounded() {
        let probe = Arc::new(FakeProbe::never());
        let containers = manager(Arc::new(FakeRunner::new()), probe.clone());

        let started = tokio::time::Instant::now();
        let healthy = containers
            .wait_for_healthy("http://localhost:11434/api/tags", 5, Duration::from_secs(3))
            .await;

        assert!(!healthy);
        assert_eq!(probe.attempts(), 5);
        assert!(started.elapsed() <= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_healthy_stops_at_first_success() {
        let probe = Arc::new(FakeProbe::ready_after(3));
        let containers = manager(Arc::new(FakeRunner::new()), probe.clone());

        let healthy = containers
            .wait_for_healthy("http://localhost:3001", 60, Duration::from_secs(3))
            .await;

        assert!(healthy);
        assert_eq!(probe.attempts(), 3);
    }

    #[tokio::test]
    async fn test_wait_for_healthy_zero_attempts() {
        let probe = Arc::new(FakeProbe::healthy());
        let containers = manager(Arc::new(FakeRunner::new()), probe.clone());

        assert!(
            !containers
                .wait_for_healthy("http://localhost:3001", 0, Duration::from_secs(1))
                .await
        );
        assert_eq!(probe.attempts(), 0);
    }

    #[test]
    fn test_parse_published_port() {
        assert_eq!(parse_published_port("0.0.0.0:11434"), Some(11434));
        assert_eq!(parse_published_port("[::]:3001\n0.0.0.0:3001"), Some(3001));
        assert_eq!(parse_published_port(""), None);
    }
}
