//! 运行时状态模块
//!
//! 管理应用状态与部署槽位

pub mod app_state;

pub use app_state::{AppState, RunningDeploy};
