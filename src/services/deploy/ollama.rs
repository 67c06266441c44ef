//! Ollama inference server deployment
//!
//! Same sequence as vLLM plus an explicit model pull, and an optional
//! guardrail step that registers a derived model carrying the system prompt.

use std::time::Duration;

use crate::config::env::constants::{
    DEFAULT_CONTEXT_LENGTH, GUARDRAIL_MODEL_NAME, OLLAMA_HEALTH_ATTEMPTS,
    OLLAMA_HEALTH_INTERVAL_SECS,
};
use crate::domain::container::{ContainerRole, ContainerSpec};
use crate::domain::deploy::{DeployStep, DeploymentRequest, InferenceEndpoint};
use crate::error::DeployError;

use super::context::DeployContext;
use super::wait_until_ready;

const ROLE: ContainerRole = ContainerRole::InferenceOllama;

/// Path of the Modelfile inside the container
const MODELFILE_PATH: &str = "/tmp/Modelfile";

/// Build the `docker run` description for the Ollama container
pub fn container_spec(request: &DeploymentRequest, network: &str) -> ContainerSpec {
    ContainerSpec::for_role(ROLE, network)
        .gpus(request.gpu_enabled)
        .volume("ollama-data:/root/.ollama")
        .publish(request.host_port(), ROLE.internal_port())
}

/// Render the Modelfile for the guardrailed derived model.
///
/// Prompts containing `"""` are rejected during request validation.
pub fn modelfile(request: &DeploymentRequest, system_prompt: &str) -> String {
    format!(
        "FROM {}\nSYSTEM \"\"\"{}\"\"\"\nPARAMETER temperature 0.7\nPARAMETER num_ctx {}\n",
        request.model_id,
        system_prompt,
        request
            .max_context_length
            .unwrap_or(DEFAULT_CONTEXT_LENGTH)
    )
}

/// Command run inside the container to write the Modelfile and create the model.
///
/// The Modelfile travels as a positional argument (`$1`), so prompt text is
/// never interpreted by the shell.
pub fn create_model_command(modelfile: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "printf '%s' \"$1\" > {path} && ollama create {model} -f {path}",
            path = MODELFILE_PATH,
            model = GUARDRAIL_MODEL_NAME
        ),
        "sh".to_string(),
        modelfile.to_string(),
    ]
}

/// Execute an Ollama deployment
pub async fn deploy(
    ctx: DeployContext<'_>,
    request: &DeploymentRequest,
) -> Result<InferenceEndpoint, DeployError> {
    let port = request.host_port();
    let name = ROLE.container_name();

    ctx.progress(DeployStep::Network, "Creating Docker network...")
        .await;
    ctx.containers.ensure_network().await?;

    ctx.progress(DeployStep::Cleanup, "Removing existing Ollama container if any...")
        .await;
    ctx.containers.remove_container(name).await?;

    ctx.progress(DeployStep::Pull, "Pulling Ollama Docker image...")
        .await;
    ctx.containers.pull_image(ROLE.image()).await?;

    ctx.progress(DeployStep::Start, "Starting Ollama container...")
        .await;
    let spec = container_spec(request, ctx.containers.network());
    ctx.containers.run_container(&spec).await?;

    ctx.progress(DeployStep::Health, "Waiting for Ollama to start...")
        .await;
    wait_until_ready(
        ctx.containers,
        ROLE,
        &format!("http://localhost:{}/api/tags", port),
        OLLAMA_HEALTH_ATTEMPTS,
        Duration::from_secs(OLLAMA_HEALTH_INTERVAL_SECS),
    )
    .await?;

    ctx.progress(
        DeployStep::Model,
        format!(
            "Pulling model {} (this may take several minutes)...",
            request.model_id
        ),
    )
    .await;
    let pull = vec![
        "ollama".to_string(),
        "pull".to_string(),
        request.model_id.clone(),
    ];
    ctx.containers.exec(name, &pull).await?;

    let mut model = request.model_id.clone();
    if let Some(prompt) = &request.guardrail_prompt {
        ctx.progress(
            DeployStep::Guardrails,
            format!("Applying guardrails via Modelfile as {}...", GUARDRAIL_MODEL_NAME),
        )
        .await;
        let command = create_model_command(&modelfile(request, prompt));
        ctx.containers.exec(name, &command).await?;
        model = GUARDRAIL_MODEL_NAME.to_string();
    }

    let url = format!("http://localhost:{}", port);
    ctx.progress(
        DeployStep::Ready,
        format!("Ollama is ready! API endpoint: {}", url),
    )
    .await;

    Ok(InferenceEndpoint { url, model })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deploy::Framework;

    fn request() -> DeploymentRequest {
        DeploymentRequest {
            framework: Framework::Ollama,
            model_id: "gemma3:1b".to_string(),
            port: Some(11434),
            gpu_enabled: false,
            max_context_length: None,
            quantization: None,
            guardrail_prompt: Some("No medical advice.".to_string()),
        }
    }

    #[test]
    fn test_container_spec_args() {
        let args = container_spec(&request(), "llmforall-net").run_args();
        assert_eq!(
            args.join(" "),
            "run -d --name llmfa-ollama --network llmforall-net \
             -v ollama-data:/root/.ollama -p 11434:11434 ollama/ollama:latest"
        );

        let mut gpu = request();
        gpu.gpu_enabled = true;
        let args = container_spec(&gpu, "llmforall-net").run_args();
        assert!(args.join(" ").contains("--gpus all"));
    }

    #[test]
    fn test_modelfile() {
        let mut req = request();
        req.max_context_length = Some(4096);
        assert_eq!(
            modelfile(&req, "No medical advice."),
            "FROM gemma3:1b\n\
             SYSTEM \"\"\"No medical advice.\"\"\"\n\
             PARAMETER temperature 0.7\n\
             PARAMETER num_ctx 4096\n"
        );
        assert!(modelfile(&request(), "x").contains("PARAMETER num_ctx 8192"));
    }

    #[test]
    fn test_create_model_command_keeps_prompt_out_of_script() {
        let prompt = "Don't say \"$HOME\"; `rm -rf /`";
        let command = create_model_command(&modelfile(&request(), prompt));

        assert_eq!(command[0], "sh");
        assert!(command[2].contains("ollama create llmfa-custom -f /tmp/Modelfile"));
        assert!(!command[2].contains(prompt));
        assert!(command[4].contains(prompt));
    }
}
