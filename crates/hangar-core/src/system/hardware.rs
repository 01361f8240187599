//! Hardware detection for accelerator selection and launch defaults.
//!
//! NVIDIA GPUs are probed via `nvidia-smi`, AMD via `rocm-smi` (falling back
//! to the ROCm install path), Apple silicon by target architecture. Probing
//! is best-effort: a machine with no detectable GPU selects the CPU backend.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use sysinfo::System;
use tracing::debug;

/// Hardware-acceleration backend for a package's dependency install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    Cpu,
    Cuda,
    Rocm,
    DirectMl,
    Mps,
}

impl Accelerator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Accelerator::Cpu => "cpu",
            Accelerator::Cuda => "cuda",
            Accelerator::Rocm => "rocm",
            Accelerator::DirectMl => "directml",
            Accelerator::Mps => "mps",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Some(Accelerator::Cpu),
            "cuda" => Some(Accelerator::Cuda),
            "rocm" => Some(Accelerator::Rocm),
            "directml" => Some(Accelerator::DirectMl),
            "mps" => Some(Accelerator::Mps),
            _ => None,
        }
    }

    /// Package index URL substituted into the dependency install for this
    /// backend. `None` means the default index.
    pub fn index_url(&self) -> Option<&'static str> {
        match self {
            Accelerator::Cpu => Some("https://download.pytorch.org/whl/cpu"),
            Accelerator::Cuda => Some("https://download.pytorch.org/whl/cu121"),
            Accelerator::Rocm => Some("https://download.pytorch.org/whl/rocm5.7"),
            // torch-directml and MPS builds ship on the default index
            Accelerator::DirectMl => None,
            Accelerator::Mps => None,
        }
    }
}

impl std::fmt::Display for Accelerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// GPU vendor classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Apple,
    Unknown,
}

/// Coarse VRAM classification used for launch-option defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryLevel {
    Low,
    Medium,
    High,
}

/// A detected GPU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuDevice {
    pub vendor: GpuVendor,
    pub name: String,
    /// Total VRAM in bytes, when the probe reports it.
    pub vram_bytes: Option<u64>,
}

impl GpuDevice {
    /// Classify VRAM into the levels launch defaults key on.
    pub fn memory_level(&self) -> MemoryLevel {
        const GIB: u64 = 1024 * 1024 * 1024;
        match self.vram_bytes {
            Some(vram) if vram < 4 * GIB => MemoryLevel::Low,
            Some(vram) if vram < 8 * GIB => MemoryLevel::Medium,
            Some(_) => MemoryLevel::High,
            None => MemoryLevel::Medium,
        }
    }
}

/// Snapshot of the hardware relevant to accelerator selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    pub gpus: Vec<GpuDevice>,
    pub total_ram_bytes: u64,
}

impl HardwareSnapshot {
    /// Probe the current machine.
    pub fn detect() -> Self {
        let mut gpus = Vec::new();
        gpus.extend(probe_nvidia());
        gpus.extend(probe_amd());

        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        gpus.push(GpuDevice {
            vendor: GpuVendor::Apple,
            name: "Apple Silicon".to_string(),
            vram_bytes: None,
        });

        let mut sys = System::new();
        sys.refresh_memory();

        Self {
            gpus,
            total_ram_bytes: sys.total_memory(),
        }
    }

    pub fn has_nvidia_gpu(&self) -> bool {
        self.gpus.iter().any(|g| g.vendor == GpuVendor::Nvidia)
    }

    pub fn has_amd_gpu(&self) -> bool {
        self.gpus.iter().any(|g| g.vendor == GpuVendor::Amd)
    }

    /// Largest VRAM classification across detected GPUs.
    pub fn max_memory_level(&self) -> Option<MemoryLevel> {
        self.gpus.iter().map(|g| g.memory_level()).max()
    }

    /// Select the accelerator backend for a package.
    ///
    /// Priority order: explicit user override > detected preferred GPU
    /// vendor > platform preference > CPU fallback. Only backends in
    /// `supported` are considered; an override outside the supported set is
    /// ignored rather than producing an uninstallable plan.
    pub fn select_accelerator(
        &self,
        supported: &[Accelerator],
        user_override: Option<Accelerator>,
    ) -> Accelerator {
        if let Some(choice) = user_override {
            if supported.contains(&choice) {
                return choice;
            }
            debug!(
                "User accelerator override {} not supported by package, ignoring",
                choice
            );
        }

        if self.has_nvidia_gpu() && supported.contains(&Accelerator::Cuda) {
            return Accelerator::Cuda;
        }

        if self.has_amd_gpu() {
            // ROCm on Linux, DirectML on Windows for AMD cards
            if cfg!(target_os = "linux") && supported.contains(&Accelerator::Rocm) {
                return Accelerator::Rocm;
            }
            if cfg!(windows) && supported.contains(&Accelerator::DirectMl) {
                return Accelerator::DirectMl;
            }
        }

        if self
            .gpus
            .iter()
            .any(|g| g.vendor == GpuVendor::Apple)
            && supported.contains(&Accelerator::Mps)
        {
            return Accelerator::Mps;
        }

        Accelerator::Cpu
    }
}

/// Probe NVIDIA GPUs via nvidia-smi.
fn probe_nvidia() -> Vec<GpuDevice> {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=name,memory.total", "--format=csv,noheader,nounits"])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            stdout
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|line| {
                    let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
                    let name = parts.first().unwrap_or(&"NVIDIA GPU").to_string();
                    let vram_bytes = parts
                        .get(1)
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(|mb| mb * 1024 * 1024);
                    GpuDevice {
                        vendor: GpuVendor::Nvidia,
                        name,
                        vram_bytes,
                    }
                })
                .collect()
        }
        Ok(output) => {
            debug!(
                "nvidia-smi returned non-zero: {}",
                String::from_utf8_lossy(&output.stderr)
            );
            vec![]
        }
        Err(e) => {
            debug!("nvidia-smi not available: {}", e);
            vec![]
        }
    }
}

/// Probe AMD GPUs via rocm-smi, falling back to the ROCm install path.
fn probe_amd() -> Vec<GpuDevice> {
    let output = Command::new("rocm-smi")
        .args(["--showproductname"])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let names: Vec<String> = stdout
                .lines()
                .filter(|l| l.contains("Card series") || l.contains("Card model"))
                .filter_map(|l| l.split(':').next_back())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

            if names.is_empty() {
                vec![]
            } else {
                names
                    .into_iter()
                    .map(|name| GpuDevice {
                        vendor: GpuVendor::Amd,
                        name,
                        vram_bytes: None,
                    })
                    .collect()
            }
        }
        _ => {
            // rocm-smi missing; an installed ROCm stack still signals AMD
            if cfg!(target_os = "linux") && Path::new("/opt/rocm").exists() {
                vec![GpuDevice {
                    vendor: GpuVendor::Amd,
                    name: "AMD GPU (ROCm)".to_string(),
                    vram_bytes: None,
                }]
            } else {
                vec![]
            }
        }
    }
}
