//! 基础设施模块
//!
//! 封装外部依赖（命令执行、HTTP 探测）

pub mod command;
pub mod probe;

#[cfg(test)]
pub mod fake;

pub use command::{CommandRunner, ProcessError, ProcessRunner};
pub use probe::{HealthProbe, HttpProbe};
