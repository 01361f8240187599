//! Launching installed packages.
//!
//! Assembles the pieces for one launch: the venv interpreter on the
//! descriptor's entry point, hardware-derived default flags plus the
//! user's stored overrides, accelerator-specific environment variables,
//! and a console parser armed with the package's readiness phrases. The
//! returned supervisor owns the child process.

use crate::descriptors::{default_args, PackageDescriptor};
use crate::registry::InstalledPackage;
use hangar_core::process::{ConsoleOutputParser, ProcessEvent, ProcessSupervisor};
use hangar_core::python::VenvRunner;
use hangar_core::system::{Accelerator, HardwareSnapshot};
use hangar_core::{HangarError, Result};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::info;

/// Launches installed packages as supervised processes.
pub struct PackageLauncher {
    hardware: HardwareSnapshot,
}

impl PackageLauncher {
    pub fn new(hardware: HardwareSnapshot) -> Self {
        Self { hardware }
    }

    /// Launch a package.
    ///
    /// `events` receives console output, the one-shot ready signal with
    /// the discovered URL, and the exit notification.
    pub fn launch(
        &self,
        descriptor: &PackageDescriptor,
        installed: &InstalledPackage,
        library_root: &Path,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) -> Result<ProcessSupervisor> {
        let install_dir = installed.full_path(library_root);
        let entry = install_dir.join(&descriptor.entry_point);
        if !entry.exists() {
            return Err(HangarError::LaunchFailed {
                package: descriptor.display_name.clone(),
                message: format!("entry point not found: {}", entry.display()),
            });
        }

        let venv = VenvRunner::new(&install_dir)
            .with_env_vars(accelerator_env(installed.accelerator));
        if !venv.exists() {
            return Err(HangarError::LaunchFailed {
                package: descriptor.display_name.clone(),
                message: "virtual environment is missing; reinstall dependencies".to_string(),
            });
        }

        let mut args = descriptor.default_args.clone();
        args.extend(default_args(&descriptor.launch_options, &self.hardware));
        // User overrides go last so they win over computed defaults
        args.extend(installed.launch_args.iter().cloned());

        let command = venv.build_command(&entry, &args);

        let mut parser = ConsoleOutputParser::new(descriptor.readiness_phrases.clone());
        if let Some(ref url) = descriptor.default_url {
            parser = parser.with_default_url(url);
        }

        info!(
            "Launching {} ({}) with args {:?}",
            descriptor.display_name, installed.version, args
        );
        ProcessSupervisor::launch(descriptor.display_name.clone(), command, parser, events)
    }
}

/// Environment overlay for the chosen accelerator backend.
fn accelerator_env(accelerator: Option<Accelerator>) -> HashMap<String, String> {
    let mut env = HashMap::new();
    match accelerator {
        Some(Accelerator::Rocm) => {
            // Consumer RDNA cards need the gfx version spoofed for ROCm
            env.insert("HSA_OVERRIDE_GFX_VERSION".to_string(), "10.3.0".to_string());
        }
        Some(Accelerator::Mps) => {
            // Fall back to CPU kernels for ops MPS doesn't implement yet
            env.insert("PYTORCH_ENABLE_MPS_FALLBACK".to_string(), "1".to_string());
        }
        Some(Accelerator::Cpu) => {
            env.insert("CUDA_VISIBLE_DEVICES".to_string(), "-1".to_string());
        }
        _ => {}
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::builtin;
    use hangar_core::shared_folders::SharedFolderStrategy;
    use hangar_core::VersionSpec;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn installed() -> InstalledPackage {
        InstalledPackage {
            id: Uuid::new_v4(),
            package_id: "sd-webui".into(),
            display_name: "Stable Diffusion WebUI".into(),
            directory_name: "sd-webui".into(),
            version: VersionSpec::release("v1.0.0", false),
            accelerator: Some(Accelerator::Rocm),
            shared_folder_strategy: SharedFolderStrategy::Symlink,
            launch_args: vec!["--port".into(), "7870".into()],
            use_shared_outputs: false,
            last_update_check: None,
        }
    }

    #[test]
    fn test_missing_entry_point_is_launch_error() {
        let temp = TempDir::new().unwrap();
        let launcher = PackageLauncher::new(HardwareSnapshot::default());
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = launcher.launch(&builtin::sd_web_ui(), &installed(), temp.path(), tx);
        assert!(matches!(result, Err(HangarError::LaunchFailed { .. })));
    }

    #[test]
    fn test_missing_venv_is_launch_error() {
        let temp = TempDir::new().unwrap();
        let package = installed();
        let install_dir = package.full_path(temp.path());
        std::fs::create_dir_all(&install_dir).unwrap();
        std::fs::write(install_dir.join("launch.py"), "").unwrap();

        let launcher = PackageLauncher::new(HardwareSnapshot::default());
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = launcher.launch(&builtin::sd_web_ui(), &package, temp.path(), tx);
        match result {
            Err(HangarError::LaunchFailed { message, .. }) => {
                assert!(message.contains("virtual environment"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_accelerator_env_overlays() {
        let rocm = accelerator_env(Some(Accelerator::Rocm));
        assert_eq!(rocm.get("HSA_OVERRIDE_GFX_VERSION").map(String::as_str), Some("10.3.0"));

        let mps = accelerator_env(Some(Accelerator::Mps));
        assert!(mps.contains_key("PYTORCH_ENABLE_MPS_FALLBACK"));

        let cpu = accelerator_env(Some(Accelerator::Cpu));
        assert_eq!(cpu.get("CUDA_VISIBLE_DEVICES").map(String::as_str), Some("-1"));

        assert!(accelerator_env(Some(Accelerator::Cuda)).is_empty());
        assert!(accelerator_env(None).is_empty());
    }
}
