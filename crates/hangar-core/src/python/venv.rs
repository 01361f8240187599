//! Virtual environment creation and pip orchestration.
//!
//! Each installed package owns one venv rooted in its install directory.
//! Creation is idempotent, installs stream their output line-wise, and a
//! cancelled install kills the pip child instead of orphaning it.

use crate::cancel::CancellationToken;
use crate::config::PathsConfig;
use crate::{HangarError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Callback invoked for each line of subprocess output.
pub type OutputCallback<'a> = Option<&'a (dyn Fn(&str) + Send + Sync)>;

/// Manages an isolated Python environment for one package.
#[derive(Debug, Clone)]
pub struct VenvRunner {
    /// The venv directory (`<package>/venv`).
    venv_dir: PathBuf,
    /// Working directory for spawned commands (the package root).
    working_dir: PathBuf,
    /// Extra environment variables applied to every command.
    env_vars: HashMap<String, String>,
    /// Shared pip cache directory.
    pip_cache_dir: Option<PathBuf>,
    /// Base interpreter used to create the venv.
    base_python: PathBuf,
}

impl VenvRunner {
    /// Create a runner for the venv inside `package_root`.
    pub fn new(package_root: impl AsRef<Path>) -> Self {
        let package_root = package_root.as_ref().to_path_buf();
        Self {
            venv_dir: package_root.join(PathsConfig::VENV_DIR_NAME),
            working_dir: package_root,
            env_vars: HashMap::new(),
            pip_cache_dir: None,
            base_python: default_base_python(),
        }
    }

    /// Set extra environment variables for all spawned commands.
    pub fn with_env_vars(mut self, env_vars: HashMap<String, String>) -> Self {
        self.env_vars = env_vars;
        self
    }

    /// Use a shared pip cache directory.
    pub fn with_pip_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pip_cache_dir = Some(dir.into());
        self
    }

    /// Override the interpreter used to create the venv.
    pub fn with_base_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.base_python = python.into();
        self
    }

    /// Path to the venv's python executable.
    pub fn python_path(&self) -> PathBuf {
        if cfg!(windows) {
            self.venv_dir.join("Scripts").join("python.exe")
        } else {
            self.venv_dir.join("bin").join("python")
        }
    }

    /// Path to the venv's executable directory (prepended to PATH on launch).
    pub fn bin_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.venv_dir.join("Scripts")
        } else {
            self.venv_dir.join("bin")
        }
    }

    pub fn venv_dir(&self) -> &Path {
        &self.venv_dir
    }

    /// Whether the venv exists (checked via its interpreter).
    pub fn exists(&self) -> bool {
        self.python_path().exists()
    }

    /// Create the venv, then upgrade installer tooling.
    ///
    /// Idempotent: an existing venv is left alone unless `force_recreate`.
    pub async fn create(
        &self,
        force_recreate: bool,
        on_output: OutputCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.exists() {
            if !force_recreate {
                debug!("Venv already exists at {}", self.venv_dir.display());
                return Ok(());
            }
            info!("Recreating venv at {}", self.venv_dir.display());
            crate::platform::remove_dir_all_with_retry(&self.venv_dir).await?;
        }

        cancel.check()?;
        info!("Creating venv at {}", self.venv_dir.display());

        let venv_arg = self.venv_dir.to_string_lossy().into_owned();
        self.stream_command(
            &self.base_python.clone(),
            &["-m".into(), "venv".into(), venv_arg],
            on_output,
            cancel,
            "venv creation",
        )
        .await
        .map_err(|e| HangarError::InstallationFailed {
            message: format!("Venv creation failed: {}", e),
        })?;

        // Fixed pre-install step: make sure pip itself is current before any
        // package installs run against it.
        let python = self.python_path();
        let _ = self
            .stream_command(
                &python,
                &[
                    "-m".into(),
                    "ensurepip".into(),
                    "--upgrade".into(),
                ],
                on_output,
                cancel,
                "ensurepip",
            )
            .await;

        self.stream_command(
            &python,
            &[
                "-m".into(),
                "pip".into(),
                "install".into(),
                "--upgrade".into(),
                "pip".into(),
                "wheel".into(),
            ],
            on_output,
            cancel,
            "pip upgrade",
        )
        .await
        .map_err(|e| HangarError::InstallationFailed {
            message: format!("pip upgrade failed: {}", e),
        })?;

        Ok(())
    }

    /// Run `pip install` with the given arguments.
    ///
    /// A non-zero exit is a `DependencyInstallFailed`: fatal to the current
    /// pipeline, with the venv left in place for diagnostics.
    pub async fn pip_install(
        &self,
        args: &[String],
        on_output: OutputCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut full_args: Vec<String> = vec!["-m".into(), "pip".into(), "install".into()];
        full_args.extend(args.iter().cloned());

        info!("pip install {}", args.join(" "));
        self.stream_command(&self.python_path(), &full_args, on_output, cancel, "pip install")
            .await
            .map_err(|e| match e {
                HangarError::InstallationCancelled => e,
                other => HangarError::DependencyInstallFailed {
                    message: other.to_string(),
                },
            })
    }

    /// Build a command that runs `entry` under the venv interpreter.
    ///
    /// The venv's bin directory is prepended to PATH and the configured env
    /// overlay applied; the supervisor adds detachment and stdio plumbing.
    pub fn build_command(&self, entry: &Path, args: &[String]) -> Command {
        let mut cmd = Command::new(self.python_path());
        cmd.arg(entry);
        cmd.args(args);
        cmd.current_dir(&self.working_dir);

        let path_var = std::env::var_os("PATH").unwrap_or_default();
        let mut paths: Vec<PathBuf> = vec![self.bin_dir()];
        paths.extend(std::env::split_paths(&path_var));
        if let Ok(joined) = std::env::join_paths(paths) {
            cmd.env("PATH", joined);
        }
        cmd.env("VIRTUAL_ENV", &self.venv_dir);

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        cmd
    }

    /// Spawn a command, stream merged output lines, honor cancellation.
    async fn stream_command(
        &self,
        program: &Path,
        args: &[String],
        on_output: OutputCallback<'_>,
        cancel: &CancellationToken,
        what: &str,
    ) -> Result<()> {
        cancel.check()?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(ref cache_dir) = self.pip_cache_dir {
            std::fs::create_dir_all(cache_dir).ok();
            cmd.env("PIP_CACHE_DIR", cache_dir);
        }
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| HangarError::InstallationFailed {
            message: format!("Failed to start {}: {}", what, e),
        })?;

        let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
        if let Some(stdout) = child.stdout.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(line_tx);

        let mut tail: Vec<String> = Vec::new();
        let mut poll = tokio::time::interval(Duration::from_millis(200));

        let status = loop {
            tokio::select! {
                line = line_rx.recv() => {
                    match line {
                        Some(line) => {
                            debug!("{}: {}", what, line);
                            if let Some(cb) = on_output {
                                cb(&line);
                            }
                            if line.contains("ERROR") {
                                warn!("{} stderr: {}", what, line);
                            }
                            tail.push(line);
                            if tail.len() > 20 {
                                tail.remove(0);
                            }
                        }
                        None => {
                            break child.wait().await.map_err(|e| {
                                HangarError::InstallationFailed {
                                    message: format!("Failed to wait for {}: {}", what, e),
                                }
                            })?;
                        }
                    }
                }
                _ = poll.tick() => {
                    if cancel.is_cancelled() {
                        info!("Cancelling {} (killing child)", what);
                        let _ = child.kill().await;
                        return Err(HangarError::InstallationCancelled);
                    }
                }
            }
        };

        if !status.success() {
            return Err(HangarError::InstallationFailed {
                message: format!("{} failed with status {}: {}", what, status, tail.join("\n")),
            });
        }

        Ok(())
    }
}

fn default_base_python() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("python")
    } else {
        PathBuf::from("python3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_python_path_layout() {
        let temp_dir = TempDir::new().unwrap();
        let runner = VenvRunner::new(temp_dir.path());

        let python = runner.python_path();
        if cfg!(windows) {
            assert!(python.ends_with("Scripts/python.exe") || python.ends_with("Scripts\\python.exe"));
        } else {
            assert!(python.ends_with("venv/bin/python"));
        }
        assert!(!runner.exists());
    }

    #[test]
    fn test_build_command_sets_virtual_env() {
        let temp_dir = TempDir::new().unwrap();
        let runner = VenvRunner::new(temp_dir.path())
            .with_env_vars(HashMap::from([("HSA_OVERRIDE_GFX_VERSION".to_string(), "10.3.0".to_string())]));

        let cmd = runner.build_command(Path::new("main.py"), &["--port".into(), "8188".into()]);
        let envs: Vec<_> = cmd
            .as_std()
            .get_envs()
            .filter_map(|(k, v)| v.map(|v| (k.to_os_string(), v.to_os_string())))
            .collect();

        assert!(envs.iter().any(|(k, _)| k == "VIRTUAL_ENV"));
        assert!(envs.iter().any(|(k, v)| k == "HSA_OVERRIDE_GFX_VERSION" && v == "10.3.0"));
    }

    #[tokio::test]
    async fn test_create_cancelled_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let runner = VenvRunner::new(temp_dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = runner.create(false, None, &cancel).await;
        assert!(matches!(result, Err(HangarError::InstallationCancelled)));
    }

    #[tokio::test]
    async fn test_pip_install_without_venv_fails() {
        let temp_dir = TempDir::new().unwrap();
        let runner = VenvRunner::new(temp_dir.path());
        let cancel = CancellationToken::new();

        let result = runner
            .pip_install(&["requests".into()], None, &cancel)
            .await;
        assert!(matches!(
            result,
            Err(HangarError::DependencyInstallFailed { .. })
        ));
    }
}
