//! Concrete pipeline steps.
//!
//! Order for a fresh install: prerequisites → fetch source → install
//! dependencies → install extensions → link shared folders → register.

use super::{PackageStep, StepContext};
use crate::installer::{DependencyInstallOptions, DependencyInstaller};
use crate::registry::{InstalledPackage, InstalledPackageRegistry};
use chrono::Utc;
use hangar_core::git::GitRunner;
use hangar_core::progress::ProgressUpdate;
use hangar_core::shared_folders::SharedFolderEngine;
use hangar_core::{HangarError, Result, VersionSpec};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Verifies external tooling before any disk mutation.
pub struct PrerequisiteStep {
    git: GitRunner,
}

impl PrerequisiteStep {
    pub fn new(git: GitRunner) -> Self {
        Self { git }
    }
}

#[async_trait::async_trait]
impl PackageStep for PrerequisiteStep {
    fn name(&self) -> &str {
        "Checking prerequisites"
    }

    async fn run(&self, _ctx: &mut StepContext) -> Result<()> {
        if !self.git.is_available().await {
            return Err(HangarError::InstallationFailed {
                message: "git is not available on PATH".to_string(),
            });
        }

        let python = if cfg!(windows) { "python" } else { "python3" };
        let python_ok = tokio::process::Command::new(python)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !python_ok {
            return Err(HangarError::InstallationFailed {
                message: format!("{} is not available on PATH", python),
            });
        }

        Ok(())
    }
}

/// Clones the package source at the resolved version.
pub struct FetchSourceStep {
    git: GitRunner,
}

impl FetchSourceStep {
    pub fn new(git: GitRunner) -> Self {
        Self { git }
    }
}

#[async_trait::async_trait]
impl PackageStep for FetchSourceStep {
    fn name(&self) -> &str {
        "Fetching source"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let url = ctx.descriptor.github_url();

        // A partial clone left by an interrupted run is swept first so the
        // clone below starts clean.
        if ctx.install_dir.exists() && !GitRunner::is_git_repo(&ctx.install_dir) {
            hangar_core::platform::remove_dir_all_with_retry(&ctx.install_dir).await?;
        }

        // The clone is this step's artifact: registered before starting so
        // an interrupted download is cleaned up, not left half-written.
        ctx.register_cleanup(&ctx.install_dir.clone());

        let progress = ctx.progress.clone();
        let on_output = move |line: &str| {
            if let Some(ref tx) = progress {
                let _ = tx.try_send(ProgressUpdate::ConsoleLine {
                    line: line.to_string(),
                });
            }
        };

        match &ctx.version {
            VersionSpec::Release { tag, .. } => {
                self.git
                    .clone_repo(&url, &ctx.install_dir, Some(tag), Some(&on_output), &ctx.cancel)
                    .await?;
            }
            VersionSpec::Branch {
                name,
                commit,
                is_latest,
            } => {
                self.git
                    .clone_repo(&url, &ctx.install_dir, Some(name), Some(&on_output), &ctx.cancel)
                    .await?;

                // Pin to the exact commit unless the head was requested
                if !is_latest && !commit.is_empty() {
                    self.git
                        .checkout(&ctx.install_dir, commit, Some(&on_output), &ctx.cancel)
                        .await?;
                }
            }
        }

        info!(
            "Fetched {} at {}",
            ctx.descriptor.display_name, ctx.version
        );
        Ok(())
    }
}

/// Moves an existing checkout to the target version.
///
/// Used by update pipelines instead of [`FetchSourceStep`]: the install
/// directory already exists and user data inside it must survive, so the
/// checkout is fetched and moved rather than re-cloned.
pub struct UpdateSourceStep {
    git: GitRunner,
}

impl UpdateSourceStep {
    pub fn new(git: GitRunner) -> Self {
        Self { git }
    }
}

#[async_trait::async_trait]
impl PackageStep for UpdateSourceStep {
    fn name(&self) -> &str {
        "Updating source"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let progress = ctx.progress.clone();
        let on_output = move |line: &str| {
            if let Some(ref tx) = progress {
                let _ = tx.try_send(ProgressUpdate::ConsoleLine {
                    line: line.to_string(),
                });
            }
        };

        // An install restored from a backup may not be a git checkout yet
        if !GitRunner::is_git_repo(&ctx.install_dir) {
            info!(
                "{} is not a git checkout, initializing",
                ctx.install_dir.display()
            );
            self.git
                .init_with_remote(
                    &ctx.install_dir,
                    &ctx.descriptor.github_url(),
                    Some(&on_output),
                    &ctx.cancel,
                )
                .await?;
        }

        match &ctx.version {
            VersionSpec::Release { tag, .. } => {
                self.git
                    .fetch(&ctx.install_dir, true, Some(&on_output), &ctx.cancel)
                    .await?;
                self.git
                    .checkout(&ctx.install_dir, tag, Some(&on_output), &ctx.cancel)
                    .await?;
            }
            VersionSpec::Branch {
                name,
                commit,
                is_latest,
            } => {
                self.git
                    .fetch(&ctx.install_dir, false, Some(&on_output), &ctx.cancel)
                    .await?;
                self.git
                    .checkout(&ctx.install_dir, name, Some(&on_output), &ctx.cancel)
                    .await?;
                if *is_latest {
                    self.git
                        .pull(&ctx.install_dir, name, Some(&on_output), &ctx.cancel)
                        .await?;
                } else if !commit.is_empty() {
                    self.git
                        .checkout(&ctx.install_dir, commit, Some(&on_output), &ctx.cancel)
                        .await?;
                }
            }
        }

        info!(
            "Updated {} to {}",
            ctx.descriptor.display_name, ctx.version
        );
        Ok(())
    }
}

/// Installs the dependency stack into the package's venv.
pub struct DependencyStep {
    installer: Arc<DependencyInstaller>,
    options: DependencyInstallOptions,
}

impl DependencyStep {
    pub fn new(installer: Arc<DependencyInstaller>, options: DependencyInstallOptions) -> Self {
        Self { installer, options }
    }
}

#[async_trait::async_trait]
impl PackageStep for DependencyStep {
    fn name(&self) -> &str {
        "Installing dependencies"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let accelerator = self
            .installer
            .install(
                &ctx.descriptor,
                &ctx.install_dir,
                &self.options,
                ctx.progress.clone(),
                &ctx.cancel,
            )
            .await?;
        ctx.accelerator = Some(accelerator);
        Ok(())
    }
}

/// An optional extension repository to clone into the package tree.
#[derive(Debug, Clone)]
pub struct ExtensionSpec {
    pub name: String,
    pub repo_url: String,
}

/// Clones requested extensions into the package's extensions directory.
pub struct ExtensionStep {
    git: GitRunner,
    extensions: Vec<ExtensionSpec>,
}

impl ExtensionStep {
    pub fn new(git: GitRunner, extensions: Vec<ExtensionSpec>) -> Self {
        Self { git, extensions }
    }
}

#[async_trait::async_trait]
impl PackageStep for ExtensionStep {
    fn name(&self) -> &str {
        "Installing extensions"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        if self.extensions.is_empty() {
            return Ok(());
        }

        if !ctx.descriptor.supports_extensions {
            return Err(HangarError::Validation {
                field: "extensions".to_string(),
                message: format!(
                    "{} does not support extensions",
                    ctx.descriptor.display_name
                ),
            });
        }

        let extensions_dir = ctx
            .descriptor
            .extensions_dir
            .as_ref()
            .map(|d| ctx.install_dir.join(d))
            .ok_or_else(|| HangarError::Config {
                message: "descriptor supports extensions but declares no directory".to_string(),
            })?;

        for extension in &self.extensions {
            let dest = extensions_dir.join(&extension.name);
            if dest.exists() {
                debug!("Extension {} already present", extension.name);
                continue;
            }

            ctx.register_cleanup(&dest);
            self.git
                .clone_repo(&extension.repo_url, &dest, None, None, &ctx.cancel)
                .await?;
            info!("Installed extension {}", extension.name);
        }

        Ok(())
    }
}

/// Applies the shared-folder layout (models and, if enabled, outputs).
pub struct SharedFolderStep;

#[async_trait::async_trait]
impl PackageStep for SharedFolderStep {
    fn name(&self) -> &str {
        "Linking shared folders"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let models_root = ctx
            .library_root
            .join(hangar_core::config::PathsConfig::MODELS_DIR_NAME);
        SharedFolderEngine::scaffold_library(&models_root)?;
        SharedFolderEngine::apply(
            &ctx.descriptor.shared_folders,
            &ctx.install_dir,
            &models_root,
            ctx.strategy,
        )
        .await?;

        if ctx.use_shared_outputs {
            let outputs_root = ctx
                .library_root
                .join(hangar_core::config::PathsConfig::OUTPUTS_DIR_NAME);
            SharedFolderEngine::apply_output_links(
                &ctx.descriptor.shared_output_paths,
                &ctx.install_dir,
                &outputs_root,
            )
            .await?;
        }

        Ok(())
    }
}

/// Persists the install into the registry.
pub struct RegisterStep {
    registry: Arc<InstalledPackageRegistry>,
}

impl RegisterStep {
    pub fn new(registry: Arc<InstalledPackageRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl PackageStep for RegisterStep {
    fn name(&self) -> &str {
        "Registering package"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let directory_name = ctx
            .install_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| HangarError::Config {
                message: format!("install dir has no name: {}", ctx.install_dir.display()),
            })?;

        let package = InstalledPackage {
            id: Uuid::new_v4(),
            package_id: ctx.descriptor.id.clone(),
            display_name: ctx.descriptor.display_name.clone(),
            directory_name,
            version: ctx.version.clone(),
            accelerator: ctx.accelerator,
            shared_folder_strategy: ctx.strategy,
            launch_args: Vec::new(),
            use_shared_outputs: ctx.use_shared_outputs,
            last_update_check: Some(Utc::now()),
        };

        self.registry.add(package.clone()).await?;
        ctx.registered = Some(package);
        Ok(())
    }
}

/// The standard fresh-install pipeline.
pub fn standard_install(
    git: GitRunner,
    installer: Arc<DependencyInstaller>,
    install_options: DependencyInstallOptions,
    extensions: Vec<ExtensionSpec>,
    registry: Arc<InstalledPackageRegistry>,
) -> super::InstallationPipeline {
    super::InstallationPipeline::new(vec![
        Box::new(PrerequisiteStep::new(git.clone())),
        Box::new(FetchSourceStep::new(git.clone())),
        Box::new(DependencyStep::new(installer, install_options)),
        Box::new(ExtensionStep::new(git, extensions)),
        Box::new(SharedFolderStep),
        Box::new(RegisterStep::new(registry)),
    ])
}

/// The standard update pipeline for an existing install.
///
/// Re-runs dependency install against the moved checkout and re-applies
/// shared folders (both idempotent); registration is replaced by the
/// caller recording the new version on success.
pub fn standard_update(
    git: GitRunner,
    installer: Arc<DependencyInstaller>,
    install_options: DependencyInstallOptions,
) -> super::InstallationPipeline {
    super::InstallationPipeline::new(vec![
        Box::new(PrerequisiteStep::new(git.clone())),
        Box::new(UpdateSourceStep::new(git)),
        Box::new(DependencyStep::new(installer, install_options)),
        Box::new(SharedFolderStep),
    ])
}
