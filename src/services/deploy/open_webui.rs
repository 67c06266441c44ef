//! Open WebUI deployment
//!
//! The UI talks to the inference server over the shared network, so its
//! environment points at the container's internal address, never localhost.

use std::time::Duration;

use crate::config::env::constants::{WEBUI_HEALTH_ATTEMPTS, WEBUI_HEALTH_INTERVAL_SECS};
use crate::domain::container::{ContainerRole, ContainerSpec};
use crate::domain::deploy::{DeployStep, Framework};
use crate::error::DeployError;

use super::context::{DeploySettings, DeployContext};
use super::wait_until_ready;

const ROLE: ContainerRole = ContainerRole::Webui;

/// Build the `docker run` description for the WebUI, wired to `framework`
pub fn container_spec(framework: Framework, settings: &DeploySettings, network: &str) -> ContainerSpec {
    let backend = framework.role();
    let spec = ContainerSpec::for_role(ROLE, network)
        .publish(settings.webui_port, ROLE.internal_port());

    let spec = match framework {
        Framework::Vllm => spec
            .env(
                "OPENAI_API_BASE_URLS",
                format!("{}/v1", backend.internal_url()),
            )
            .env("OPENAI_API_KEYS", "not-needed"),
        Framework::Ollama => spec.env("OLLAMA_BASE_URL", backend.internal_url()),
    };

    // 单用户本地部署，不需要登录
    spec.env("WEBUI_AUTH", "false")
        .volume("open-webui-data:/app/backend/data")
}

/// Execute the WebUI deployment, returning its external URL
pub async fn deploy(ctx: DeployContext<'_>, framework: Framework) -> Result<String, DeployError> {
    let port = ctx.settings.webui_port;
    let url = format!("http://localhost:{}", port);

    ctx.progress(
        DeployStep::WebuiCleanup,
        "Removing existing Open WebUI container if any...",
    )
    .await;
    ctx.containers.remove_container(ROLE.container_name()).await?;
    ctx.containers.ensure_network().await?;

    ctx.progress(DeployStep::WebuiPull, "Pulling Open WebUI Docker image...")
        .await;
    ctx.containers.pull_image(ROLE.image()).await?;

    ctx.progress(DeployStep::WebuiStart, "Starting Open WebUI...")
        .await;
    let spec = container_spec(framework, ctx.settings, ctx.containers.network());
    ctx.containers.run_container(&spec).await?;

    ctx.progress(DeployStep::WebuiHealth, "Waiting for Open WebUI to start...")
        .await;
    wait_until_ready(
        ctx.containers,
        ROLE,
        &url,
        WEBUI_HEALTH_ATTEMPTS,
        Duration::from_secs(WEBUI_HEALTH_INTERVAL_SECS),
    )
    .await?;

    ctx.progress(
        DeployStep::WebuiReady,
        format!("Open WebUI is ready at {}", url),
    )
    .await;

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings() -> DeploySettings {
        DeploySettings {
            hf_cache: PathBuf::from("/tmp/hf"),
            webui_port: 3001,
        }
    }

    #[test]
    fn test_vllm_wiring_uses_internal_address() {
        let spec = container_spec(Framework::Vllm, &settings(), "llmforall-net");
        assert!(spec.env.contains(&(
            "OPENAI_API_BASE_URLS".to_string(),
            "http://llmfa-vllm:8000/v1".to_string()
        )));
        assert!(spec
            .env
            .contains(&("OPENAI_API_KEYS".to_string(), "not-needed".to_string())));
        assert!(!spec.env.iter().any(|(_, v)| v.contains("localhost")));
    }

    #[test]
    fn test_ollama_wiring_and_auth_disabled() {
        let args = container_spec(Framework::Ollama, &settings(), "llmforall-net").run_args();
        assert_eq!(
            args.join(" "),
            "run -d --name llmfa-webui --network llmforall-net \
             -v open-webui-data:/app/backend/data -p 3001:8080 \
             -e OLLAMA_BASE_URL=http://llmfa-ollama:11434 -e WEBUI_AUTH=false \
             ghcr.io/open-webui/open-webui:main"
        );
    }
}
