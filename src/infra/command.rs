//! 命令执行器
//!
//! 与容器引擎交互的唯一入口，支持：
//! - 超时控制（超时后 kill 子进程）
//! - stdout 捕获上限
//! - 长命令的逐行流式输出
//!
//! 通过 [`ProcessRunner`] trait 注入，测试中可替换为假实现

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::env::constants::MAX_OUTPUT_BYTES;
use crate::domain::deploy::LogLine;

/// 失败时保留的 stderr 尾部行数（流式模式）
const STDERR_TAIL_LINES: usize = 20;

/// 命令执行错误
#[derive(Debug, Error)]
pub enum ProcessError {
    /// 命令启动失败（未安装、无权限等）
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 命令超时
    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// 非零退出，消息即 stderr 原文
    #[error("{}", describe_failure(.command, .code, .stderr))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// 读取输出或等待进程失败
    #[error("I/O error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// 失败输出是否包含指定文本（用于容忍 "already exists" 一类错误）
    pub fn output_contains(&self, needle: &str) -> bool {
        match self {
            ProcessError::Failed { stderr, .. } => stderr.contains(needle),
            _ => false,
        }
    }
}

fn describe_failure(command: &str, code: &Option<i32>, stderr: &str) -> String {
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match code {
        Some(code) => format!("`{}` exited with code {}", command, code),
        None => format!("`{}` was terminated by a signal", command),
    }
}

/// 渲染命令行（仅用于日志和错误消息）
pub fn render_command(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// 外部命令执行接口
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// 执行命令并返回去除首尾空白的 stdout
    ///
    /// 超时或非零退出返回错误
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, ProcessError>;

    /// 执行长命令，stdout/stderr 逐行发送到 `log_tx`
    ///
    /// 成功返回退出码 0，非零退出返回错误
    async fn stream_run(
        &self,
        program: &str,
        args: &[String],
        log_tx: mpsc::UnboundedSender<LogLine>,
        timeout: Duration,
    ) -> Result<i32, ProcessError>;
}

/// 基于 tokio::process 的命令执行器
#[derive(Debug, Clone)]
pub struct CommandRunner {
    max_output_bytes: usize,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self {
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }

    /// 自定义 stdout 捕获上限
    pub fn with_output_limit(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, ProcessError> {
        let command = render_command(program, args);
        debug!(command = %command, "Running command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = self.max_output_bytes;

        let result = tokio::time::timeout(timeout, async {
            tokio::try_join!(
                read_capped(stdout, cap),
                read_capped(stderr, cap),
                child.wait()
            )
        })
        .await;

        let (stdout, stderr, status) = match result {
            Err(_) => {
                warn!(command = %command, timeout_secs = timeout.as_secs(), "Command timed out, killing process");
                let _ = child.kill().await;
                return Err(ProcessError::Timeout { command, timeout });
            }
            Ok(Err(source)) => return Err(ProcessError::Io { command, source }),
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&stdout).trim().to_string();
        if status.success() {
            return Ok(stdout);
        }

        let mut stderr = String::from_utf8_lossy(&stderr).trim().to_string();
        if stderr.is_empty() {
            stderr = stdout;
        }
        debug!(command = %command, code = ?status.code(), stderr = %stderr, "Command failed");
        Err(ProcessError::Failed {
            command,
            code: status.code(),
            stderr,
        })
    }

    async fn stream_run(
        &self,
        program: &str,
        args: &[String],
        log_tx: mpsc::UnboundedSender<LogLine>,
        timeout: Duration,
    ) -> Result<i32, ProcessError> {
        let command = render_command(program, args);
        debug!(command = %command, "Running streaming command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // 启动 stdout 读取任务
        let stdout_tx = log_tx.clone();
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = stdout_tx.send(LogLine::stdout(line));
                }
            }
        });

        // 启动 stderr 读取任务，保留尾部用于错误消息
        let stderr_tx = log_tx;
        let stderr_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line.clone());
                    let _ = stderr_tx.send(LogLine::stderr(line));
                }
            }
            tail
        });

        let status = tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                warn!(command = %command, timeout_secs = timeout.as_secs(), "Streaming command timed out, killing process");
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(ProcessError::Timeout { command, timeout });
            }
            status = child.wait() => status.map_err(|source| ProcessError::Io {
                command: command.clone(),
                source,
            })?,
        };

        // 等待日志读取完成
        let _ = stdout_task.await;
        let tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            return Ok(status.code().unwrap_or(0));
        }

        Err(ProcessError::Failed {
            command,
            code: status.code(),
            stderr: tail.join("\n").trim().to_string(),
        })
    }
}

/// 读取全部输出，只保留前 `cap` 字节（继续读取以免子进程因管道写满而阻塞）
async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    cap: usize,
) -> std::io::Result<Vec<u8>> {
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(kept.len());
        kept.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok(kept)
}
