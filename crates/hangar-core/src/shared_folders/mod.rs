//! Shared-folder layout engine.
//!
//! Reconciles a package's private model/output directories with the central
//! model library, either by filesystem symlinks or by patching the
//! package's own config file. Application is idempotent; removal restores
//! the package to a standalone-launchable state.

pub mod config;
pub mod layout;
pub mod symlink;

pub use layout::{
    ConfigDefaultMode, ConfigFormat, ConfigSharingOptions, LayoutRule, ModelCategory,
    SharedFolderLayout, SharedFolderStrategy,
};

use crate::{HangarError, Result};
use std::path::Path;
use tracing::{debug, info};

/// The shared-folder layout engine.
pub struct SharedFolderEngine;

impl SharedFolderEngine {
    /// Point the package's model lookup at the shared library.
    pub async fn apply(
        layout: &SharedFolderLayout,
        package_root: &Path,
        library_models_root: &Path,
        strategy: SharedFolderStrategy,
    ) -> Result<()> {
        match strategy {
            SharedFolderStrategy::None => Ok(()),
            SharedFolderStrategy::Symlink => {
                symlink::apply_links(layout, package_root, library_models_root).await
            }
            SharedFolderStrategy::ConfigPatch => {
                Self::patch_config(layout, package_root, |rule| {
                    shared_paths_for_rule(rule, library_models_root)
                })
                .await
            }
        }
    }

    /// Undo `apply`, leaving the package launchable standalone.
    ///
    /// Symlinks are deleted (real directories are never touched); patched
    /// configs get their declared keys restored to package-relative
    /// defaults rather than deleted.
    pub async fn remove(
        layout: &SharedFolderLayout,
        package_root: &Path,
        strategy: SharedFolderStrategy,
    ) -> Result<()> {
        match strategy {
            SharedFolderStrategy::None => Ok(()),
            SharedFolderStrategy::Symlink => symlink::remove_links(layout, package_root).await,
            SharedFolderStrategy::ConfigPatch => {
                let clear_paths = match layout.options.default_mode {
                    ConfigDefaultMode::ClearRoot => layout
                        .options
                        .root_key
                        .clone()
                        .map(|k| vec![k])
                        .unwrap_or_default(),
                    ConfigDefaultMode::TargetRelativePaths => vec![],
                };

                Self::patch_config_with_clears(
                    layout,
                    package_root,
                    |rule| default_paths_for_rule(rule, package_root),
                    &clear_paths,
                )
                .await
            }
        }
    }

    /// Link the package's output directories at the shared outputs root.
    pub async fn apply_output_links(
        output_relative_paths: &[String],
        package_root: &Path,
        outputs_root: &Path,
    ) -> Result<()> {
        for rel in output_relative_paths {
            let dest = package_root.join(rel);
            symlink::create_or_update_link(outputs_root, &dest).await?;
        }
        Ok(())
    }

    /// Remove output links created by `apply_output_links`.
    pub async fn remove_output_links(
        output_relative_paths: &[String],
        package_root: &Path,
    ) -> Result<()> {
        let layout = SharedFolderLayout::new(vec![LayoutRule::default()
            .with_targets(output_relative_paths.iter().cloned())]);
        symlink::remove_links(&layout, package_root).await
    }

    /// Create the per-category directory skeleton under the models root.
    pub fn scaffold_library(library_models_root: &Path) -> Result<()> {
        for category in ModelCategory::all() {
            let dir = library_models_root.join(category.dir_name());
            std::fs::create_dir_all(&dir).map_err(|e| HangarError::io_with_path(e, dir))?;
        }
        Ok(())
    }

    async fn patch_config(
        layout: &SharedFolderLayout,
        package_root: &Path,
        paths_for_rule: impl Fn(&LayoutRule) -> Vec<String>,
    ) -> Result<()> {
        Self::patch_config_with_clears(layout, package_root, paths_for_rule, &[]).await
    }

    async fn patch_config_with_clears(
        layout: &SharedFolderLayout,
        package_root: &Path,
        paths_for_rule: impl Fn(&LayoutRule) -> Vec<String>,
        clear_paths: &[String],
    ) -> Result<()> {
        let rel_path = layout.config_path.as_ref().ok_or_else(|| HangarError::Config {
            message: "layout declares ConfigPatch but no config path".to_string(),
        })?;
        let format = layout.config_format.ok_or_else(|| HangarError::Config {
            message: "layout declares ConfigPatch but no config format".to_string(),
        })?;

        let config_path = package_root.join(rel_path);
        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HangarError::io_with_path(e, parent.to_path_buf()))?;
        }

        let existing = match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(HangarError::io_with_path(e, config_path)),
        };

        let dialect = config::dialect_for(format);
        let updated = dialect.update(
            &config_path,
            &existing,
            layout,
            &paths_for_rule,
            clear_paths,
            &layout.options,
        )?;

        // Skip the write when nothing changed so a second apply is a
        // filesystem no-op.
        if updated == existing {
            debug!("Config already up to date: {}", config_path.display());
            return Ok(());
        }

        info!("Patching config {}", config_path.display());
        tokio::fs::write(&config_path, updated)
            .await
            .map_err(|e| HangarError::io_with_path(e, config_path))?;
        Ok(())
    }
}

/// Library-side absolute paths for a rule (apply direction).
fn shared_paths_for_rule(rule: &LayoutRule, library_models_root: &Path) -> Vec<String> {
    if rule.is_root {
        return vec![library_models_root.to_string_lossy().into_owned()];
    }

    rule.categories
        .iter()
        .map(|category| {
            let mut path = library_models_root.join(category.dir_name());
            if let Some(ref sub) = rule.source_sub_path {
                path = path.join(sub);
            }
            path.to_string_lossy().into_owned()
        })
        .collect()
}

/// Package-relative default paths for a rule (remove direction).
fn default_paths_for_rule(rule: &LayoutRule, package_root: &Path) -> Vec<String> {
    rule.target_relative_paths
        .iter()
        .map(|rel| package_root.join(rel).to_string_lossy().into_owned())
        .collect()
}
