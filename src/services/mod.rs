//! 服务层模块
//!
//! 包含核心业务逻辑

pub mod deploy;
pub mod lifecycle;
pub mod scanner;

pub use deploy::{Orchestrator, ProgressEmitter};
pub use lifecycle::ContainerManager;
pub use scanner::Scanner;
