//! Shared-folder layout model.
//!
//! A layout declares how one package's model directories map onto the
//! central library: which abstract categories it consumes, where they live
//! relative to the package root, and (for packages that read paths from
//! their own config file) which config keys to patch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Abstract model kinds shared across packages.
///
/// This is the stable vocabulary layout rules are keyed on, decoupled from
/// any single package's directory naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelCategory {
    Checkpoint,
    Diffuser,
    Lora,
    Vae,
    ApproxVae,
    Embedding,
    Hypernetwork,
    ControlNet,
    IpAdapter,
    ClipModel,
    ClipVision,
    TextEncoder,
    DiffusionModel,
    Upscaler,
    Gligen,
}

impl ModelCategory {
    /// Directory name under `<library>/Models/`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ModelCategory::Checkpoint => "Checkpoints",
            ModelCategory::Diffuser => "Diffusers",
            ModelCategory::Lora => "Lora",
            ModelCategory::Vae => "VAE",
            ModelCategory::ApproxVae => "ApproxVAE",
            ModelCategory::Embedding => "Embeddings",
            ModelCategory::Hypernetwork => "Hypernetworks",
            ModelCategory::ControlNet => "ControlNet",
            ModelCategory::IpAdapter => "IpAdapters",
            ModelCategory::ClipModel => "CLIP",
            ModelCategory::ClipVision => "ClipVision",
            ModelCategory::TextEncoder => "TextEncoders",
            ModelCategory::DiffusionModel => "DiffusionModels",
            ModelCategory::Upscaler => "Upscalers",
            ModelCategory::Gligen => "GLIGEN",
        }
    }

    /// All categories, for library directory scaffolding.
    pub fn all() -> &'static [ModelCategory] {
        &[
            ModelCategory::Checkpoint,
            ModelCategory::Diffuser,
            ModelCategory::Lora,
            ModelCategory::Vae,
            ModelCategory::ApproxVae,
            ModelCategory::Embedding,
            ModelCategory::Hypernetwork,
            ModelCategory::ControlNet,
            ModelCategory::IpAdapter,
            ModelCategory::ClipModel,
            ModelCategory::ClipVision,
            ModelCategory::TextEncoder,
            ModelCategory::DiffusionModel,
            ModelCategory::Upscaler,
            ModelCategory::Gligen,
        ]
    }
}

/// How a package consumes the shared library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedFolderStrategy {
    /// Directory symlinks from the package's model dirs into the library.
    Symlink,
    /// Patch the package's own config file to point at the library.
    ConfigPatch,
    /// Leave the package standalone.
    None,
}

/// Config file dialect for the `ConfigPatch` strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
    /// Block-indented hierarchical text (extra model path files).
    Yaml,
    /// Structured object tree (settings documents).
    Json,
    /// Flat `key: value` lines with preserved unknown content.
    Flat,
}

/// What `remove` writes back for patched keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigDefaultMode {
    /// Restore each declared key to the package-relative default path.
    #[default]
    TargetRelativePaths,
    /// Clear the engine-owned root key entirely.
    ClearRoot,
}

/// Options controlling how the owned subsection is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSharingOptions {
    /// Subsection owned by the engine (e.g. a `hangar` mapping in YAML or a
    /// dotted object path in JSON). Empty means keys live at the root.
    pub root_key: Option<String>,
    /// Behavior of `remove` for this layout.
    #[serde(default)]
    pub default_mode: ConfigDefaultMode,
}

/// One mapping from categories to package-relative locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutRule {
    /// Source categories in the shared library. Empty for rules that bind a
    /// fixed target with no library category (template caches).
    #[serde(default)]
    pub categories: Vec<ModelCategory>,
    /// Package-relative directories this rule controls (symlink targets,
    /// and the restore values for config defaults).
    #[serde(default)]
    pub target_relative_paths: Vec<String>,
    /// Config keys this rule sets under the owned subsection. Empty for
    /// symlink-only rules.
    #[serde(default)]
    pub config_document_paths: Vec<String>,
    /// Bind the package's model-root key to the library root, skipping
    /// per-category mapping.
    #[serde(default)]
    pub is_root: bool,
    /// Optional sub-path appended to each category directory.
    #[serde(default)]
    pub source_sub_path: Option<String>,
}

impl LayoutRule {
    pub fn new(categories: impl Into<Vec<ModelCategory>>) -> Self {
        Self {
            categories: categories.into(),
            ..Default::default()
        }
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_relative_paths = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config_document_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sub_path(mut self, sub_path: impl Into<String>) -> Self {
        self.source_sub_path = Some(sub_path.into());
        self
    }

    pub fn root() -> Self {
        Self {
            is_root: true,
            ..Default::default()
        }
    }
}

/// A package's complete shared-folder layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedFolderLayout {
    /// Ordered mapping rules.
    pub rules: Vec<LayoutRule>,
    /// Config file relative to the package root, for `ConfigPatch`.
    pub config_path: Option<String>,
    /// Dialect of `config_path`.
    pub config_format: Option<ConfigFormat>,
    /// Subsection/default handling options.
    #[serde(default)]
    pub options: ConfigSharingOptions,
}

impl SharedFolderLayout {
    pub fn new(rules: Vec<LayoutRule>) -> Self {
        Self {
            rules,
            ..Default::default()
        }
    }

    pub fn with_config(
        mut self,
        path: impl Into<String>,
        format: ConfigFormat,
        options: ConfigSharingOptions,
    ) -> Self {
        self.config_path = Some(path.into());
        self.config_format = Some(format);
        self.options = options;
        self
    }

    /// Group rules by config document path, unioning rules that declare the
    /// same key.
    ///
    /// Multiple rules may legitimately target one key (e.g. two category
    /// sets feeding the same lookup path); their categories and sub-paths
    /// are merged rather than the later rule overwriting the earlier one.
    pub fn rules_by_config_path(&self) -> BTreeMap<String, LayoutRule> {
        let mut merged: BTreeMap<String, LayoutRule> = BTreeMap::new();

        for rule in &self.rules {
            for config_path in &rule.config_document_paths {
                let entry = merged.entry(config_path.clone()).or_insert_with(|| {
                    let mut r = rule.clone();
                    r.config_document_paths = vec![config_path.clone()];
                    r.categories.clear();
                    r.target_relative_paths.clear();
                    r
                });

                for category in &rule.categories {
                    if !entry.categories.contains(category) {
                        entry.categories.push(*category);
                    }
                }
                for target in &rule.target_relative_paths {
                    if !entry.target_relative_paths.contains(target) {
                        entry.target_relative_paths.push(target.clone());
                    }
                }
                entry.is_root |= rule.is_root;
                if entry.source_sub_path.is_none() {
                    entry.source_sub_path = rule.source_sub_path.clone();
                }
            }
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_dir_names_unique() {
        let mut seen = std::collections::HashSet::new();
        for category in ModelCategory::all() {
            assert!(seen.insert(category.dir_name()), "duplicate dir name");
        }
    }

    #[test]
    fn test_rules_by_config_path_unions() {
        let layout = SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Lora])
                .with_targets(["models/loras"])
                .with_config_paths(["loras"]),
            LayoutRule::new([ModelCategory::Hypernetwork])
                .with_targets(["models/hypernetworks"])
                .with_config_paths(["loras"]),
        ]);

        let merged = layout.rules_by_config_path();
        assert_eq!(merged.len(), 1);

        let rule = &merged["loras"];
        assert!(rule.categories.contains(&ModelCategory::Lora));
        assert!(rule.categories.contains(&ModelCategory::Hypernetwork));
        assert_eq!(rule.target_relative_paths.len(), 2);
    }

    #[test]
    fn test_rules_by_config_path_separate_keys() {
        let layout = SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Checkpoint])
                .with_targets(["models/checkpoints"])
                .with_config_paths(["checkpoints"]),
            LayoutRule::new([ModelCategory::Vae])
                .with_targets(["models/vae"])
                .with_config_paths(["vae"]),
        ]);

        let merged = layout.rules_by_config_path();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["checkpoints"].categories, vec![ModelCategory::Checkpoint]);
        assert_eq!(merged["vae"].categories, vec![ModelCategory::Vae]);
    }

    #[test]
    fn test_symlink_only_rules_have_no_config_entries() {
        let layout = SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Lora]).with_targets(["models/loras"])
        ]);
        assert!(layout.rules_by_config_path().is_empty());
    }

    #[test]
    fn test_serde_round_trip() {
        let layout = SharedFolderLayout::new(vec![LayoutRule::root()]).with_config(
            "config.json",
            ConfigFormat::Json,
            ConfigSharingOptions {
                root_key: Some("paths".into()),
                default_mode: ConfigDefaultMode::ClearRoot,
            },
        );

        let json = serde_json::to_string(&layout).unwrap();
        let back: SharedFolderLayout = serde_json::from_str(&json).unwrap();
        assert!(back.rules[0].is_root);
        assert_eq!(back.config_format, Some(ConfigFormat::Json));
    }
}
