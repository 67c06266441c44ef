//! LLMfA Agent - 本地 LLM 推理栈部署代理
//!
//! Usage:
//! - Normal mode: `llmfa-agent`
//! - With custom port: `llmfa-agent --port 4000`

use llmfa_agent::RuntimeConfig;

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("LLMfA Agent - 本地 LLM 推理栈部署代理");
    println!();
    println!("USAGE:");
    println!("    llmfa-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port");
    println!("    -h, --help       Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    PORT / LLMFA_PORT             Listening port (default 3000)");
    println!("    LLMFA_DOCKER_BIN              Docker executable (default docker)");
    println!("    LLMFA_NETWORK                 Shared network (default llmforall-net)");
    println!("    LLMFA_HF_CACHE                HuggingFace cache mounted into vLLM");
    println!("    LLMFA_WEBUI_PORT              Open WebUI host port (default 3001)");
    println!("    LLMFA_COMMAND_TIMEOUT_SECS    Per-command timeout (default 1800)");
    println!("    RUST_LOG                      Log filter");
}

fn main() -> anyhow::Result<()> {
    let config = parse_args();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(llmfa_agent::init_and_run_agent_with_config(config))
}
