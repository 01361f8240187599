//! Dependency installation for package environments.
//!
//! Builds and executes the ordered install plan for one package's isolated
//! environment: venv creation, installer tooling upgrade, the pinned
//! accelerator stack from the backend-specific index, the package's own
//! requirements (with accelerator lines filtered so the pins win), and
//! user overrides last.

use crate::descriptors::PackageDescriptor;
use hangar_core::cancel::CancellationToken;
use hangar_core::progress::{send_progress, ProgressUpdate};
use hangar_core::python::VenvRunner;
use hangar_core::system::{Accelerator, HardwareSnapshot};
use hangar_core::{HangarError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Lines matching this pattern in upstream requirements are skipped so the
/// pinned accelerator versions win over whatever upstream declares.
const ACCELERATOR_PACKAGE_PATTERN: &str =
    r"(?i)^(torch|torchvision|torchaudio|torch-directml|xformers)\s*(?:[=<>!~\[;]|$)";

/// Options for one dependency install.
#[derive(Debug, Clone, Default)]
pub struct DependencyInstallOptions {
    /// Tear down and recreate an existing venv.
    pub force_recreate_venv: bool,
    /// Explicit accelerator choice; wins over detection.
    pub accelerator_override: Option<Accelerator>,
    /// Per-package version overrides (`numpy==1.26.4`), applied last so
    /// they take precedence over everything computed above.
    pub version_overrides: Vec<String>,
}

/// Installs a package's dependency stack into its environment.
pub struct DependencyInstaller {
    hardware: HardwareSnapshot,
    pip_cache_dir: Option<PathBuf>,
}

impl DependencyInstaller {
    pub fn new(hardware: HardwareSnapshot) -> Self {
        Self {
            hardware,
            pip_cache_dir: None,
        }
    }

    /// Use a shared pip cache for all installs.
    pub fn with_pip_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pip_cache_dir = Some(dir.into());
        self
    }

    /// Select the accelerator backend for a descriptor.
    ///
    /// Priority: explicit user override > descriptor preference > probed
    /// hardware > CPU fallback.
    pub fn select_accelerator(
        &self,
        descriptor: &PackageDescriptor,
        user_override: Option<Accelerator>,
    ) -> Accelerator {
        self.hardware.select_accelerator(
            &descriptor.supported_accelerators,
            user_override.or(descriptor.preferred_accelerator),
        )
    }

    /// Run the full dependency install for a package checkout.
    ///
    /// Returns the accelerator the environment was built for. Any pip
    /// failure surfaces as `DependencyInstallFailed` and leaves the venv in
    /// place for diagnostics.
    pub async fn install(
        &self,
        descriptor: &PackageDescriptor,
        install_dir: &Path,
        options: &DependencyInstallOptions,
        progress: Option<mpsc::Sender<ProgressUpdate>>,
        cancel: &CancellationToken,
    ) -> Result<Accelerator> {
        let mut venv = VenvRunner::new(install_dir);
        if let Some(ref cache) = self.pip_cache_dir {
            venv = venv.with_pip_cache(cache);
        }

        send_progress(
            &progress,
            ProgressUpdate::Fraction {
                value: None,
                message: "Setting up virtual environment".into(),
            },
        )
        .await;

        venv.create(options.force_recreate_venv, None, cancel).await?;

        let accelerator = self.select_accelerator(descriptor, options.accelerator_override);
        info!(
            "Installing {} dependencies with {} backend",
            descriptor.display_name, accelerator
        );

        send_progress(
            &progress,
            ProgressUpdate::Fraction {
                value: None,
                message: format!("Installing {} acceleration stack", accelerator),
            },
        )
        .await;

        let on_output = pip_progress_callback(progress.clone());
        let on_output_ref: Option<&(dyn Fn(&str) + Send + Sync)> = on_output.as_deref();

        venv.pip_install(&accelerator_install_args(accelerator), on_output_ref, cancel)
            .await?;

        // Upstream requirements, minus the accelerator lines the pins above
        // already satisfied
        let requirements_path = install_dir.join("requirements.txt");
        if requirements_path.exists() {
            let content = tokio::fs::read_to_string(&requirements_path)
                .await
                .map_err(|e| HangarError::io_with_path(e, requirements_path.clone()))?;
            let filtered = filter_requirements(&content);

            if filtered.is_empty() {
                debug!("requirements.txt is empty after filtering");
            } else {
                send_progress(
                    &progress,
                    ProgressUpdate::Fraction {
                        value: None,
                        message: "Installing package requirements".into(),
                    },
                )
                .await;

                let filtered_path = install_dir.join("requirements.hangar.txt");
                tokio::fs::write(&filtered_path, filtered.join("\n"))
                    .await
                    .map_err(|e| HangarError::io_with_path(e, filtered_path.clone()))?;

                let args = vec![
                    "-r".to_string(),
                    filtered_path.to_string_lossy().into_owned(),
                ];
                let result = venv.pip_install(&args, on_output_ref, cancel).await;
                let _ = tokio::fs::remove_file(&filtered_path).await;
                result?;
            }
        } else {
            info!("No requirements.txt for {}", descriptor.display_name);
        }

        // User overrides last: they beat both the pins and upstream
        if !options.version_overrides.is_empty() {
            send_progress(
                &progress,
                ProgressUpdate::Fraction {
                    value: None,
                    message: "Applying version overrides".into(),
                },
            )
            .await;
            venv.pip_install(&options.version_overrides, on_output_ref, cancel)
                .await?;
        }

        info!(
            "Dependencies installed for {} ({})",
            descriptor.display_name, accelerator
        );
        Ok(accelerator)
    }
}

/// Pinned install arguments for an accelerator backend.
///
/// Versions are pinned together so the torch/vision/xformers triplet stays
/// consistent regardless of what upstream requirements ask for.
fn accelerator_install_args(accelerator: Accelerator) -> Vec<String> {
    let mut args: Vec<String> = match accelerator {
        Accelerator::Cpu | Accelerator::Rocm | Accelerator::Mps => {
            vec!["torch==2.1.2".into(), "torchvision==0.16.2".into()]
        }
        Accelerator::Cuda => vec![
            "torch==2.1.2".into(),
            "torchvision==0.16.2".into(),
            "xformers==0.0.23.post1".into(),
        ],
        Accelerator::DirectMl => vec!["torch-directml".into()],
    };

    if let Some(index_url) = accelerator.index_url() {
        args.push("--index-url".into());
        args.push(index_url.into());
    }

    args
}

/// Keep requirement lines, dropping comments, pip options, and accelerator
/// packages.
fn filter_requirements(content: &str) -> Vec<String> {
    let accelerator_re = Regex::new(ACCELERATOR_PACKAGE_PATTERN).unwrap();

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
        .filter(|line| !accelerator_re.is_match(line))
        .map(str::to_string)
        .collect()
}

/// Parse pip's "Collecting <package>" lines into dependency progress.
fn pip_progress_callback(
    progress: Option<mpsc::Sender<ProgressUpdate>>,
) -> Option<Box<dyn Fn(&str) + Send + Sync>> {
    let tx = progress?;
    let collecting_re = Regex::new(r"(?i)collecting\s+([a-zA-Z0-9_.-]+)").unwrap();
    let completed = AtomicU32::new(0);

    Some(Box::new(move |line: &str| {
        if let Some(caps) = collecting_re.captures(line) {
            let package = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            let count = completed.fetch_add(1, Ordering::SeqCst);
            let _ = tx.try_send(ProgressUpdate::Dependency {
                package,
                completed_count: count,
                total_count: None,
            });
        } else {
            let _ = tx.try_send(ProgressUpdate::ConsoleLine {
                line: line.to_string(),
            });
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hangar_core::system::{GpuDevice, GpuVendor};

    #[test]
    fn test_filter_requirements_drops_accelerator_lines() {
        let content = r#"
# Main dependencies
torch>=2.0.0
torchvision
torchaudio==2.1.0
xformers>=0.0.20
numpy==1.24.0
pillow[webp]
einops
-r extra.txt
--extra-index-url https://example.invalid/simple
"#;

        let filtered = filter_requirements(content);
        assert_eq!(filtered, vec!["numpy==1.24.0", "pillow[webp]", "einops"]);
    }

    #[test]
    fn test_filter_keeps_torch_adjacent_names() {
        // Packages that merely start with an accelerator name survive
        let content = "torchsde\ntorchdiffeq\ntorch\n";
        let filtered = filter_requirements(content);
        assert_eq!(filtered, vec!["torchsde", "torchdiffeq"]);
    }

    #[test]
    fn test_accelerator_args_use_backend_index() {
        let cuda = accelerator_install_args(Accelerator::Cuda);
        assert!(cuda.iter().any(|a| a.starts_with("xformers")));
        assert!(cuda.iter().any(|a| a.contains("cu121")));

        let cpu = accelerator_install_args(Accelerator::Cpu);
        assert!(cpu.iter().any(|a| a.contains("/cpu")));
        assert!(!cpu.iter().any(|a| a.starts_with("xformers")));

        let directml = accelerator_install_args(Accelerator::DirectMl);
        assert_eq!(directml, vec!["torch-directml"]);
    }

    #[test]
    fn test_select_accelerator_priority() {
        const GIB: u64 = 1024 * 1024 * 1024;
        let hardware = HardwareSnapshot {
            gpus: vec![GpuDevice {
                vendor: GpuVendor::Nvidia,
                name: "test".into(),
                vram_bytes: Some(12 * GIB),
            }],
            total_ram_bytes: 32 * GIB,
        };
        let installer = DependencyInstaller::new(hardware);
        let descriptor = crate::descriptors::builtin::comfy_ui();

        // User override wins over the probed NVIDIA GPU
        assert_eq!(
            installer.select_accelerator(&descriptor, Some(Accelerator::Cpu)),
            Accelerator::Cpu
        );
        // Probed hardware otherwise
        assert_eq!(
            installer.select_accelerator(&descriptor, None),
            Accelerator::Cuda
        );
    }

    #[test]
    fn test_select_accelerator_cpu_fallback() {
        let installer = DependencyInstaller::new(HardwareSnapshot::default());
        let descriptor = crate::descriptors::builtin::comfy_ui();
        assert_eq!(
            installer.select_accelerator(&descriptor, None),
            Accelerator::Cpu
        );
    }
}
