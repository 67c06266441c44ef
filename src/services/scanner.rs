//! 主机能力扫描
//!
//! CPU / 内存 / 磁盘 / OS 来自 sysinfo；GPU 与 Docker 通过外部命令探测，
//! 工具缺失或执行失败一律视为"不存在"，扫描本身从不报错

use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, warn};

use crate::config::env::constants::QUERY_TIMEOUT_SECS;
use crate::config::EnvConfig;
use crate::domain::system::{
    CpuInfo, DiskInfo, DockerInfo, GpuInfo, GpuVendor, OsInfo, RamInfo, SystemSpecs,
};
use crate::infra::ProcessRunner;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// 能力扫描器
#[derive(Clone)]
pub struct Scanner {
    runner: Arc<dyn ProcessRunner>,
    docker: String,
    timeout: Duration,
}

/// sysinfo 采集的部分
#[derive(Debug, Default)]
struct HostSnapshot {
    cpu: CpuInfo,
    ram: RamInfo,
    disk: DiskInfo,
    os: OsInfo,
}

impl Scanner {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: &EnvConfig) -> Self {
        Self {
            runner,
            docker: config.docker_bin.clone(),
            timeout: Duration::from_secs(QUERY_TIMEOUT_SECS),
        }
    }

    /// 完整扫描，各项并发执行
    pub async fn scan(&self) -> SystemSpecs {
        let host = tokio::task::spawn_blocking(host_snapshot);
        let (gpu, docker) = tokio::join!(self.detect_external_gpu(), self.detect_docker());

        let host = host.await.unwrap_or_else(|e| {
            warn!(error = %e, "Host snapshot task failed");
            HostSnapshot::default()
        });

        // Apple Silicon 没有独立显卡工具，统一内存即显存
        let gpu = gpu
            .or_else(|| apple_silicon_gpu(&host.os, &host.cpu, host.ram.total_gb))
            .unwrap_or_else(GpuInfo::none);

        SystemSpecs {
            cpu: host.cpu,
            gpu,
            ram: host.ram,
            disk: host.disk,
            os: host.os,
            docker,
        }
    }

    /// 只探测 GPU（部署请求未给出 gpuEnabled 时使用）
    pub async fn detect_gpu(&self) -> GpuInfo {
        if let Some(gpu) = self.detect_external_gpu().await {
            return gpu;
        }

        let host = tokio::task::spawn_blocking(host_snapshot)
            .await
            .unwrap_or_default();
        apple_silicon_gpu(&host.os, &host.cpu, host.ram.total_gb).unwrap_or_else(GpuInfo::none)
    }

    async fn detect_external_gpu(&self) -> Option<GpuInfo> {
        if let Some(out) = self
            .query(
                "nvidia-smi",
                &["--query-gpu=name,memory.total", "--format=csv,noheader,nounits"],
            )
            .await
        {
            if let Some(gpu) = parse_nvidia_smi(&out) {
                return Some(gpu);
            }
        }

        let out = self
            .query(
                "rocm-smi",
                &["--showproductname", "--showmeminfo", "vram", "--csv"],
            )
            .await?;
        parse_rocm_smi(&out)
    }

    /// Docker 安装 / 运行状态
    pub async fn detect_docker(&self) -> DockerInfo {
        let docker = self.docker.clone();
        let Some(version) = self.query(&docker, &["--version"]).await else {
            return DockerInfo::default();
        };

        let running = self.query(&docker, &["info"]).await.is_some();
        DockerInfo {
            installed: true,
            running,
            version: parse_docker_version(&version),
        }
    }

    /// 执行探测命令；失败或无输出时返回 None
    async fn query(&self, program: &str, args: &[&str]) -> Option<String> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        match self.runner.run(program, &args, self.timeout).await {
            Ok(out) if !out.is_empty() => Some(out),
            Ok(_) => None,
            Err(e) => {
                debug!(program, error = %e, "Capability probe unavailable");
                None
            }
        }
    }
}

fn host_snapshot() -> HostSnapshot {
    let mut sys = System::new_with_specifics(
        RefreshKind::new()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything()),
    );
    sys.refresh_cpu_all();

    let cpu = CpuInfo {
        model: sys
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        cores: sys.cpus().len(),
        architecture: std::env::consts::ARCH.to_string(),
    };

    let ram = RamInfo {
        total_gb: to_gib(sys.total_memory()),
        available_gb: to_gib(sys.available_memory()),
    };

    let disks = Disks::new_with_refreshed_list();
    let available = disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().max_by_key(|d| d.total_space()))
        .map(|d| d.available_space())
        .unwrap_or(0);

    let os = OsInfo {
        platform: platform_name(std::env::consts::OS).to_string(),
        version: System::kernel_version().unwrap_or_default(),
    };

    HostSnapshot {
        cpu,
        ram,
        disk: DiskInfo {
            available_gb: to_gib(available),
        },
        os,
    }
}

/// 与前端约定的平台名（darwin / linux / win32）
fn platform_name(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

fn to_gib(bytes: u64) -> u64 {
    (bytes as f64 / GIB).round() as u64
}

fn apple_silicon_gpu(os: &OsInfo, cpu: &CpuInfo, total_ram_gb: u64) -> Option<GpuInfo> {
    if os.platform != "darwin" || !cpu.model.contains("Apple") {
        return None;
    }
    Some(GpuInfo {
        available: true,
        vendor: GpuVendor::Apple,
        model: cpu.model.clone(),
        vram_gb: total_ram_gb,
    })
}

/// `nvidia-smi --query-gpu=name,memory.total --format=csv,noheader,nounits`
/// 取第一块卡，显存单位 MiB
fn parse_nvidia_smi(output: &str) -> Option<GpuInfo> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut parts = line.split(',').map(str::trim);
    let name = parts.next().filter(|n| !n.is_empty())?;
    let vram_mib: f64 = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0.0);

    Some(GpuInfo {
        available: true,
        vendor: GpuVendor::Nvidia,
        model: name.to_string(),
        vram_gb: (vram_mib / 1024.0).round() as u64,
    })
}

/// `rocm-smi --showproductname --showmeminfo vram --csv`
fn parse_rocm_smi(output: &str) -> Option<GpuInfo> {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    let header: Vec<&str> = lines.next()?.split(',').collect();
    let row: Vec<&str> = lines.find(|l| l.starts_with("card"))?.split(',').collect();

    let column = |needle: &str| {
        header
            .iter()
            .position(|h| h.contains(needle))
            .and_then(|i| row.get(i))
            .map(|v| v.trim())
    };

    let model = column("Card series")
        .or_else(|| row.get(1).map(|v| v.trim()))
        .filter(|m| !m.is_empty())
        .unwrap_or("Unknown AMD GPU");
    let vram_bytes = column("VRAM Total Memory")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    Some(GpuInfo {
        available: true,
        vendor: GpuVendor::Amd,
        model: model.to_string(),
        vram_gb: to_gib(vram_bytes),
    })
}

/// `Docker version 27.3.1, build ce12230` -> `27.3.1`
fn parse_docker_version(output: &str) -> String {
    output
        .trim()
        .trim_start_matches("Docker version ")
        .split(',')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::fake::FakeRunner;

    fn scanner(runner: Arc<FakeRunner>) -> Scanner {
        Scanner::new(runner, &EnvConfig::default())
    }

    #[test]
    fn test_parse_nvidia_smi() {
        let gpu = parse_nvidia_smi("NVIDIA GeForce RTX 4090, 24564\nNVIDIA GeForce RTX 3060, 12288").unwrap();
        assert_eq!(gpu.vendor, GpuVendor::Nvidia);
        assert_eq!(gpu.model, "NVIDIA GeForce RTX 4090");
        assert_eq!(gpu.vram_gb, 24);
        assert!(parse_nvidia_smi("").is_none());
    }

    #[test]
    fn test_parse_rocm_smi() {
        let out = "device,Card series,Card model,Card vendor,Card SKU,VRAM Total Memory (B),VRAM Total Used Memory (B)\n\
                   card0,Radeon RX 7900 XTX,0x744c,Advanced Micro Devices,D7070100,25753026560,1048576";
        let gpu = parse_rocm_smi(out).unwrap();
        assert_eq!(gpu.vendor, GpuVendor::Amd);
        assert_eq!(gpu.model, "Radeon RX 7900 XTX");
        assert_eq!(gpu.vram_gb, 24);
    }

    #[test]
    fn test_parse_docker_version() {
        assert_eq!(parse_docker_version("Docker version 27.3.1, build ce12230"), "27.3.1");
    }

    #[test]
    fn test_apple_silicon_unified_memory() {
        let os = OsInfo {
            platform: "darwin".to_string(),
            version: "24.1.0".to_string(),
        };
        let cpu = CpuInfo {
            model: "Apple M3 Max".to_string(),
            cores: 16,
            architecture: "aarch64".to_string(),
        };
        let gpu = apple_silicon_gpu(&os, &cpu, 64).unwrap();
        assert_eq!(gpu.vendor, GpuVendor::Apple);
        assert_eq!(gpu.vram_gb, 64);

        let linux = OsInfo {
            platform: "linux".to_string(),
            ..os
        };
        assert!(apple_silicon_gpu(&linux, &cpu, 64).is_none());
    }

    #[tokio::test]
    async fn test_detect_gpu_prefers_nvidia() {
        let runner = Arc::new(FakeRunner::new());
        runner.on("nvidia-smi", "NVIDIA L4, 23034");
        let gpu = scanner(runner.clone()).detect_gpu().await;

        assert!(gpu.supports_docker_gpus());
        assert_eq!(gpu.vram_gb, 22);
        assert!(runner.calls_matching("rocm-smi").is_empty());
    }

    #[tokio::test]
    async fn test_missing_tools_are_not_errors() {
        let runner = Arc::new(FakeRunner::new());
        runner
            .fail("nvidia-smi", "nvidia-smi: command not found")
            .fail("rocm-smi", "rocm-smi: command not found")
            .fail("docker", "docker: command not found");
        let scanner = scanner(runner);

        let docker = scanner.detect_docker().await;
        assert!(!docker.installed);
        assert!(!docker.running);

        let specs = scanner.scan().await;
        assert!(!specs.gpu.supports_docker_gpus());
        assert!(!specs.docker.installed);
        assert!(specs.cpu.cores > 0);
    }

    #[tokio::test]
    async fn test_docker_installed_but_daemon_down() {
        let runner = Arc::new(FakeRunner::new());
        runner
            .on("docker --version", "Docker version 27.3.1, build ce12230")
            .fail("docker info", "Cannot connect to the Docker daemon");

        let docker = scanner(runner).detect_docker().await;
        assert!(docker.installed);
        assert!(!docker.running);
        assert_eq!(docker.version, "27.3.1");
    }
}
