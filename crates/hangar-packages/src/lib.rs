//! Hangar Packages - Package lifecycle orchestration.
//!
//! Builds on `hangar-core` to manage third-party AI-generation packages:
//! descriptors describing each supported upstream project, version
//! resolution against the hosting provider, dependency installation into
//! isolated environments, the install/update pipeline, and the persisted
//! registry of installs.

pub mod descriptors;
pub mod installer;
pub mod launcher;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod testing;

// Re-export commonly used types
pub use descriptors::{builtin, LaunchOptionDef, PackageDescriptor};
pub use installer::{DependencyInstallOptions, DependencyInstaller};
pub use launcher::PackageLauncher;
pub use pipeline::steps::{standard_install, standard_update, ExtensionSpec};
pub use pipeline::{InstallationPipeline, PackageStep, StepContext};
pub use registry::{InstalledPackage, InstalledPackageRegistry};
pub use resolver::VersionResolver;

// Re-export core types callers almost always need alongside this crate
pub use hangar_core::{
    Accelerator, CancellationToken, HangarError, Result, SharedFolderStrategy, VersionSpec,
};
