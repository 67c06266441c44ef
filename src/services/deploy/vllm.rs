//! vLLM inference server deployment
//!
//! network -> cleanup -> pull -> start -> health -> ready. Weights are
//! downloaded by the server on first load, so there is no model step.

use std::time::Duration;

use crate::config::env::constants::{
    DEFAULT_CONTEXT_LENGTH, VLLM_HEALTH_ATTEMPTS, VLLM_HEALTH_INTERVAL_SECS,
};
use crate::domain::container::{ContainerRole, ContainerSpec};
use crate::domain::deploy::{DeployStep, DeploymentRequest, InferenceEndpoint};
use crate::error::DeployError;

use super::context::{DeploySettings, DeployContext};
use super::wait_until_ready;

const ROLE: ContainerRole = ContainerRole::InferenceVllm;

/// Build the `docker run` description for the vLLM container
pub fn container_spec(
    request: &DeploymentRequest,
    settings: &DeploySettings,
    network: &str,
) -> ContainerSpec {
    let mut spec = ContainerSpec::for_role(ROLE, network)
        .gpus(request.gpu_enabled)
        .volume(format!(
            "{}:/root/.cache/huggingface",
            settings.hf_cache.display()
        ))
        .publish(request.host_port(), ROLE.internal_port())
        .flag("--ipc=host")
        .arg("--model")
        .arg(&request.model_id);

    if let Some(quantization) = &request.quantization {
        spec = spec.arg("--quantization").arg(quantization);
    }

    spec.arg("--max-model-len")
        .arg(
            request
                .max_context_length
                .unwrap_or(DEFAULT_CONTEXT_LENGTH)
                .to_string(),
        )
        .arg("--gpu-memory-utilization")
        .arg("0.9")
}

/// Execute a vLLM deployment
pub async fn deploy(
    ctx: DeployContext<'_>,
    request: &DeploymentRequest,
) -> Result<InferenceEndpoint, DeployError> {
    let port = request.host_port();
    let name = ROLE.container_name();

    ctx.progress(DeployStep::Network, "Creating Docker network...")
        .await;
    ctx.containers.ensure_network().await?;

    ctx.progress(DeployStep::Cleanup, "Removing existing vLLM container if any...")
        .await;
    ctx.containers.remove_container(name).await?;

    ctx.progress(
        DeployStep::Pull,
        "Pulling vLLM Docker image (this may take a few minutes)...",
    )
    .await;
    ctx.containers.pull_image(ROLE.image()).await?;

    ctx.progress(
        DeployStep::Start,
        format!("Starting vLLM with model {}...", request.model_id),
    )
    .await;
    let spec = container_spec(request, ctx.settings, ctx.containers.network());
    ctx.containers.run_container(&spec).await?;

    ctx.progress(
        DeployStep::Health,
        "Waiting for vLLM to load the model (this can take several minutes)...",
    )
    .await;
    wait_until_ready(
        ctx.containers,
        ROLE,
        &format!("http://localhost:{}/v1/models", port),
        VLLM_HEALTH_ATTEMPTS,
        Duration::from_secs(VLLM_HEALTH_INTERVAL_SECS),
    )
    .await?;

    let url = format!("http://localhost:{}", port);
    ctx.progress(
        DeployStep::Ready,
        format!("vLLM is ready! API endpoint: {}/v1", url),
    )
    .await;

    Ok(InferenceEndpoint {
        url,
        model: request.model_id.clone(),
    })
}
