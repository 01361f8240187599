//! The installation pipeline.
//!
//! An install or update is an ordered list of idempotent steps sharing one
//! progress channel and one cancellation token. Steps run strictly
//! sequentially; the first failure halts the remainder. Steps register the
//! files they create, and that cleanup runs only for transient failures —
//! a failed dependency install keeps its environment on disk for
//! diagnosis.

pub mod steps;

use crate::descriptors::PackageDescriptor;
use hangar_core::cancel::CancellationToken;
use hangar_core::progress::{send_progress, ProgressUpdate};
use hangar_core::shared_folders::SharedFolderStrategy;
use hangar_core::system::Accelerator;
use hangar_core::{HangarError, Result, VersionSpec};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Shared state threaded through a pipeline run.
pub struct StepContext {
    pub descriptor: PackageDescriptor,
    /// Install directory under `<library>/Packages/`.
    pub install_dir: PathBuf,
    /// Library root holding `Models/` and `Outputs/`.
    pub library_root: PathBuf,
    /// Version being installed or updated to.
    pub version: VersionSpec,
    pub strategy: SharedFolderStrategy,
    /// Chosen by the dependency step; read by registration.
    pub accelerator: Option<Accelerator>,
    /// Record created by the registration step.
    pub registered: Option<crate::registry::InstalledPackage>,
    /// Link package outputs into the shared outputs root.
    pub use_shared_outputs: bool,
    pub progress: Option<mpsc::Sender<ProgressUpdate>>,
    pub cancel: CancellationToken,
    /// Paths created by completed steps, removed if a later step fails
    /// with a transient error.
    cleanup_paths: Vec<PathBuf>,
}

impl StepContext {
    pub fn new(
        descriptor: PackageDescriptor,
        install_dir: PathBuf,
        library_root: PathBuf,
        version: VersionSpec,
        strategy: SharedFolderStrategy,
    ) -> Self {
        Self {
            descriptor,
            install_dir,
            library_root,
            version,
            strategy,
            accelerator: None,
            registered: None,
            use_shared_outputs: false,
            progress: None,
            cancel: CancellationToken::new(),
            cleanup_paths: Vec::new(),
        }
    }

    pub fn with_progress(mut self, progress: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_shared_outputs(mut self, enabled: bool) -> Self {
        self.use_shared_outputs = enabled;
        self
    }

    /// Register a path for cleanup should a later step fail transiently.
    pub fn register_cleanup(&mut self, path: impl Into<PathBuf>) {
        self.cleanup_paths.push(path.into());
    }
}

/// One unit of pipeline work.
#[async_trait::async_trait]
pub trait PackageStep: Send + Sync {
    /// Short name shown in progress updates.
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut StepContext) -> Result<()>;
}

/// Runs an ordered list of steps with progress and rollback.
pub struct InstallationPipeline {
    steps: Vec<Box<dyn PackageStep>>,
}

impl InstallationPipeline {
    pub fn new(steps: Vec<Box<dyn PackageStep>>) -> Self {
        Self { steps }
    }

    /// Execute all steps in order.
    ///
    /// Each step's postconditions are the next step's preconditions, so
    /// execution is strictly sequential. On failure the remaining steps do
    /// not run; registered artifacts are deleted unless the error keeps
    /// them for diagnosis (`DependencyInstallFailed`), and exactly one
    /// summary error propagates to the caller.
    pub async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let total = self.steps.len();

        for (index, step) in self.steps.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                let err = HangarError::InstallationCancelled;
                self.fail(ctx, &err).await;
                return Err(err);
            }

            info!(
                "Pipeline step {}/{}: {} ({})",
                index + 1,
                total,
                step.name(),
                ctx.descriptor.display_name
            );
            send_progress(
                &ctx.progress,
                ProgressUpdate::StepStarted {
                    step: step.name().to_string(),
                    index,
                    total,
                },
            )
            .await;

            if let Err(err) = step.run(ctx).await {
                error!(
                    "Step {} failed for {}: {}",
                    step.name(),
                    ctx.descriptor.display_name,
                    err
                );
                self.fail(ctx, &err).await;
                return Err(err);
            }
        }

        send_progress(&ctx.progress, ProgressUpdate::Completed { success: true }).await;
        Ok(())
    }

    async fn fail(&self, ctx: &mut StepContext, err: &HangarError) {
        send_progress(
            &ctx.progress,
            ProgressUpdate::Error {
                message: err.to_string(),
            },
        )
        .await;

        if err.should_cleanup_artifacts() {
            for path in ctx.cleanup_paths.drain(..) {
                if !path.exists() {
                    continue;
                }
                info!("Cleaning up partial artifact {}", path.display());
                if let Err(cleanup_err) =
                    hangar_core::platform::remove_dir_all_with_retry(&path).await
                {
                    warn!("Cleanup of {} failed: {}", path.display(), cleanup_err);
                }
            }
        } else {
            info!("Keeping artifacts on disk for diagnosis");
        }

        send_progress(&ctx.progress, ProgressUpdate::Completed { success: false }).await;
    }
}
