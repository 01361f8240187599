//! Package descriptors.
//!
//! One descriptor exists per supported upstream project. A descriptor is a
//! read-only capability record: identity, version-resolution flags, launch
//! schema, and the shared-folder layout. Forks are modeled by copying a
//! base record and overriding named fields — there is no inheritance chain
//! to dispatch through.

pub mod builtin;
pub mod launch;

pub use launch::{default_args, LaunchDefault, LaunchOptionDef, LaunchOptionKind, LaunchOptionValue};

use hangar_core::shared_folders::{SharedFolderLayout, SharedFolderStrategy};
use hangar_core::system::Accelerator;

/// Capability record for one supported upstream project.
///
/// Instances are constructed once (see [`builtin`]) and treated as
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    /// Stable identifier ("comfyui", "sd-webui").
    pub id: String,
    pub display_name: String,
    /// GitHub owner.
    pub author: String,
    /// GitHub repository name.
    pub repo_name: String,
    pub blurb: String,
    /// Branch tracked when releases are ignored or absent.
    pub main_branch: String,
    /// Upstream tags releases but they lag the branch; track commits.
    pub ignores_release_tags: bool,
    /// Supports cloning extension repositories into the package tree.
    pub supports_extensions: bool,
    /// Directory extensions are cloned into, relative to the package root.
    pub extensions_dir: Option<String>,
    /// Accelerator backends this package's dependency set supports.
    pub supported_accelerators: Vec<Accelerator>,
    /// Backend the package works best with, consulted before probing.
    pub preferred_accelerator: Option<Accelerator>,
    /// Entry-point script relative to the package root.
    pub entry_point: String,
    /// Arguments always passed to the entry point.
    pub default_args: Vec<String>,
    /// Typed CLI flag schema.
    pub launch_options: Vec<LaunchOptionDef>,
    /// Console phrases that signal the server is up.
    pub readiness_phrases: Vec<String>,
    /// Fallback service URL when the console never prints one.
    pub default_url: Option<String>,
    /// Shared-folder mapping for this package's directory conventions.
    pub shared_folders: SharedFolderLayout,
    /// Output directories mapped onto the shared outputs root.
    pub shared_output_paths: Vec<String>,
    pub recommended_strategy: SharedFolderStrategy,
}

impl PackageDescriptor {
    /// `owner/name` slug for the hosting API.
    pub fn repo(&self) -> String {
        format!("{}/{}", self.author, self.repo_name)
    }

    /// Clone URL of the upstream repository.
    pub fn github_url(&self) -> String {
        format!("https://github.com/{}/{}", self.author, self.repo_name)
    }

    /// Derive a fork descriptor from a base.
    ///
    /// Copies every capability of `base`, then rebinds identity; callers
    /// override further fields directly on the returned record. This keeps
    /// "X is a fork of Y" as data instead of a type hierarchy.
    pub fn fork_of(
        base: &PackageDescriptor,
        id: impl Into<String>,
        display_name: impl Into<String>,
        author: impl Into<String>,
        repo_name: impl Into<String>,
    ) -> Self {
        let mut descriptor = base.clone();
        descriptor.id = id.into();
        descriptor.display_name = display_name.into();
        descriptor.author = author.into();
        descriptor.repo_name = repo_name.into();
        descriptor
    }
}
