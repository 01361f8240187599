//! Hangar Core - Headless engine for AI-generation package orchestration.
//!
//! This crate provides the primitives behind installing, updating, and
//! launching third-party AI-generation packages: GitHub listings, shell git
//! operations, isolated Python environments, the shared-folder layout
//! engine, and detached process supervision.
//!
//! Package descriptors, version resolution, and the install pipeline live
//! in the `hangar-packages` crate.

pub mod cancel;
pub mod config;
pub mod error;
pub mod git;
pub mod metadata;
pub mod models;
pub mod network;
pub mod platform;
pub mod process;
pub mod progress;
pub mod python;
pub mod shared_folders;
pub mod system;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use error::{HangarError, Result};
pub use git::GitRunner;
pub use metadata::{atomic_read_json, atomic_write_json};
pub use models::{GitHubBranch, GitHubCommit, GitHubRelease, VersionSpec};
pub use network::{GitHubClient, SourceHost};
pub use process::{ConsoleOutputParser, ProcessEvent, ProcessState, ProcessSupervisor};
pub use progress::ProgressUpdate;
pub use python::VenvRunner;
pub use shared_folders::{
    ConfigFormat, LayoutRule, ModelCategory, SharedFolderEngine, SharedFolderLayout,
    SharedFolderStrategy,
};
pub use system::{Accelerator, HardwareSnapshot};
