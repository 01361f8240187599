//! Non-destructive config-file patching.
//!
//! Packages that read model paths from their own config file get a single
//! engine-owned subsection patched in place. Each dialect parses the
//! existing document into its native tree, sets only the declared keys, and
//! re-serializes — sibling keys and sections authored by the user or the
//! upstream package survive untouched. A malformed existing document is
//! surfaced as `ConfigParse` and the file is left alone.

mod flat;
mod json;
mod yaml;

pub use flat::FlatDialect;
pub use json::JsonDialect;
pub use yaml::YamlDialect;

use crate::shared_folders::layout::{ConfigFormat, ConfigSharingOptions, LayoutRule, SharedFolderLayout};
use crate::Result;
use std::path::Path;

/// A config-file dialect handler.
///
/// Dispatch is resolved once per layout from the declared [`ConfigFormat`],
/// not per call site.
pub trait ConfigDialect: Send + Sync {
    /// Patch `content`, setting each grouped rule's declared keys to the
    /// paths produced by `paths_for_rule`, removing `clear_paths` from the
    /// document root, and preserving everything else.
    ///
    /// `content` may be empty (new file). `path` is for error context only.
    fn update(
        &self,
        path: &Path,
        content: &str,
        layout: &SharedFolderLayout,
        paths_for_rule: &dyn Fn(&LayoutRule) -> Vec<String>,
        clear_paths: &[String],
        options: &ConfigSharingOptions,
    ) -> Result<String>;
}

/// Resolve the handler for a declared format.
pub fn dialect_for(format: ConfigFormat) -> &'static dyn ConfigDialect {
    match format {
        ConfigFormat::Yaml => &YamlDialect,
        ConfigFormat::Json => &JsonDialect,
        ConfigFormat::Flat => &FlatDialect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_folders::layout::{LayoutRule, ModelCategory};
    use std::path::PathBuf;

    #[test]
    fn test_dialect_dispatch_produces_native_syntax() {
        let layout = SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Vae])
                .with_targets(["models/vae"])
                .with_config_paths(["vae"]),
        ]);
        let options = ConfigSharingOptions::default();
        let paths = |_: &LayoutRule| vec!["/library/Models/VAE".to_string()];

        let yaml = dialect_for(ConfigFormat::Yaml)
            .update(&PathBuf::from("a"), "", &layout, &paths, &[], &options)
            .unwrap();
        let json = dialect_for(ConfigFormat::Json)
            .update(&PathBuf::from("a"), "", &layout, &paths, &[], &options)
            .unwrap();
        let flat = dialect_for(ConfigFormat::Flat)
            .update(&PathBuf::from("a"), "", &layout, &paths, &[], &options)
            .unwrap();

        assert!(yaml.contains("vae: /library/Models/VAE"));
        assert!(json.trim_start().starts_with('{'));
        assert_eq!(flat, "vae: /library/Models/VAE\n");
    }
}
