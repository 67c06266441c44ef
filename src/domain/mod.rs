//! 领域模型模块
//!
//! 部署请求、进度事件、容器与主机能力等数据结构

pub mod container;
pub mod deploy;
pub mod system;

pub use container::{ContainerRole, ContainerSpec};
pub use deploy::{
    DeployRequestBody, DeployStep, DeployedStack, DeploymentRequest, Framework,
    InferenceEndpoint, LogLine, ProgressEvent, ValidationError,
};
pub use system::SystemSpecs;
