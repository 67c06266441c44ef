//! 测试用的假执行器与假探测器
//!
//! `FakeRunner` 记录每条命令行并按子串规则返回预设输出，
//! `FakeProbe` 按 URL 计数探测次数

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use super::command::{render_command, ProcessError, ProcessRunner};
use super::probe::HealthProbe;
use crate::domain::deploy::LogLine;

#[derive(Clone)]
enum Reply {
    Stdout(String),
    Stderr(String),
    Timeout,
}

struct Rule {
    pattern: String,
    reply: Reply,
}

/// 假命令执行器
///
/// 规则按添加顺序倒序匹配（后添加的优先），未匹配时返回空 stdout
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<String>>,
    rules: Mutex<Vec<Rule>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 命令行包含 `pattern` 时成功并返回 `stdout`
    pub fn on(&self, pattern: &str, stdout: &str) -> &Self {
        self.push(pattern, Reply::Stdout(stdout.to_string()))
    }

    /// 命令行包含 `pattern` 时以 `stderr` 失败
    pub fn fail(&self, pattern: &str, stderr: &str) -> &Self {
        self.push(pattern, Reply::Stderr(stderr.to_string()))
    }

    /// 命令行包含 `pattern` 时超时
    pub fn hang(&self, pattern: &str) -> &Self {
        self.push(pattern, Reply::Timeout)
    }

    fn push(&self, pattern: &str, reply: Reply) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            reply,
        });
        self
    }

    /// 所有已执行的命令行
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// 包含 `pattern` 的命令行
    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.contains(pattern))
            .collect()
    }

    fn reply_for(&self, command: &str, timeout: Duration) -> Result<String, ProcessError> {
        self.calls.lock().unwrap().push(command.to_string());

        let reply = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|rule| command.contains(&rule.pattern))
            .map(|rule| rule.reply.clone());

        match reply {
            None => Ok(String::new()),
            Some(Reply::Stdout(out)) => Ok(out),
            Some(Reply::Stderr(stderr)) => Err(ProcessError::Failed {
                command: command.to_string(),
                code: Some(1),
                stderr,
            }),
            Some(Reply::Timeout) => Err(ProcessError::Timeout {
                command: command.to_string(),
                timeout,
            }),
        }
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, ProcessError> {
        self.reply_for(&render_command(program, args), timeout)
    }

    async fn stream_run(
        &self,
        program: &str,
        args: &[String],
        log_tx: mpsc::UnboundedSender<LogLine>,
        timeout: Duration,
    ) -> Result<i32, ProcessError> {
        let out = self.reply_for(&render_command(program, args), timeout)?;
        if !out.is_empty() {
            let _ = log_tx.send(LogLine::stdout(out));
        }
        Ok(0)
    }
}

/// 假探测器
pub struct FakeProbe {
    /// 同一 URL 第 n 次探测起返回就绪；None 表示永不就绪
    ready_after: Option<usize>,
    /// URL 包含这些子串时永不就绪
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeProbe {
    /// 首次探测即就绪
    pub fn healthy() -> Self {
        Self::ready_after(1)
    }

    /// 永不就绪
    pub fn never() -> Self {
        Self {
            ready_after: None,
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 第 n 次探测起就绪
    pub fn ready_after(attempts: usize) -> Self {
        Self {
            ready_after: Some(attempts),
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// URL 包含 `pattern` 时永不就绪
    pub fn failing_for(mut self, pattern: &str) -> Self {
        self.failing.push(pattern.to_string());
        self
    }

    /// 探测总次数
    pub fn attempts(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// 已探测过的 URL（按顺序）
    pub fn urls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn is_ready(&self, url: &str) -> bool {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(url.to_string());
            calls.iter().filter(|u| u.as_str() == url).count()
        };

        if self.failing.iter().any(|p| url.contains(p.as_str())) {
            return false;
        }
        self.ready_after.map_or(false, |n| seen >= n)
    }
}
