//! 主机能力快照领域模型

use serde::{Deserialize, Serialize};

/// 主机能力快照（只读）
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemSpecs {
    pub cpu: CpuInfo,
    pub gpu: GpuInfo,
    pub ram: RamInfo,
    pub disk: DiskInfo,
    pub os: OsInfo,
    pub docker: DockerInfo,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CpuInfo {
    pub model: String,
    pub cores: usize,
    pub architecture: String,
}

/// GPU 厂商
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Apple,
    Intel,
    #[default]
    None,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GpuInfo {
    pub available: bool,
    pub vendor: GpuVendor,
    pub model: String,
    #[serde(rename = "vramGB")]
    pub vram_gb: u64,
}

impl GpuInfo {
    pub fn none() -> Self {
        Self {
            available: false,
            vendor: GpuVendor::None,
            model: "No GPU detected".to_string(),
            vram_gb: 0,
        }
    }

    /// 能否使用 `docker run --gpus all`（需要 NVIDIA container runtime）
    pub fn supports_docker_gpus(&self) -> bool {
        self.available && self.vendor == GpuVendor::Nvidia
    }
}

impl Default for GpuInfo {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RamInfo {
    #[serde(rename = "totalGB")]
    pub total_gb: u64,
    #[serde(rename = "availableGB")]
    pub available_gb: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DiskInfo {
    #[serde(rename = "availableGB")]
    pub available_gb: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct OsInfo {
    pub platform: String,
    pub version: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DockerInfo {
    pub installed: bool,
    pub running: bool,
    pub version: String,
}
