//! Flat dialect: custom `key: value` lines.
//!
//! The simplest of the three formats: one key per line, no nesting.
//! Patching is line-based, so comments, blank lines, and unrecognized
//! content are preserved byte-for-byte. Multi-path rules take the first
//! path (the format has no list syntax).

use super::ConfigDialect;
use crate::shared_folders::layout::{ConfigSharingOptions, LayoutRule, SharedFolderLayout};
use crate::Result;
use std::collections::BTreeMap;
use std::path::Path;

pub struct FlatDialect;

impl ConfigDialect for FlatDialect {
    fn update(
        &self,
        _path: &Path,
        content: &str,
        layout: &SharedFolderLayout,
        paths_for_rule: &dyn Fn(&LayoutRule) -> Vec<String>,
        clear_paths: &[String],
        _options: &ConfigSharingOptions,
    ) -> Result<String> {
        let mut updates: BTreeMap<String, Option<String>> = BTreeMap::new();

        for (config_path, rule) in layout.rules_by_config_path() {
            let value = paths_for_rule(&rule).into_iter().next();
            updates.insert(config_path, value);
        }
        for clear_path in clear_paths {
            updates.insert(clear_path.clone(), None);
        }

        let mut lines: Vec<String> = Vec::new();
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

        for line in content.lines() {
            match parse_key(line) {
                Some(key) if updates.contains_key(key) => {
                    let key = key.to_string();
                    seen.insert(key.clone());
                    match &updates[&key] {
                        Some(value) => lines.push(format!("{}: {}", key, value)),
                        None => {
                            // Key cleared: drop the line
                        }
                    }
                }
                _ => lines.push(line.to_string()),
            }
        }

        // Append keys that were not already present
        for (key, value) in &updates {
            if seen.contains(key) {
                continue;
            }
            if let Some(value) = value {
                lines.push(format!("{}: {}", key, value));
            }
        }

        let mut out = lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }
}

/// Extract the key from a `key: value` line. Comments and blank lines have
/// no key and are passed through untouched.
fn parse_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    trimmed.split(':').next().map(str::trim).filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_folders::layout::{LayoutRule, ModelCategory};
    use std::path::PathBuf;

    fn layout() -> SharedFolderLayout {
        SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Checkpoint])
                .with_targets(["Models/Stable-Diffusion"])
                .with_config_paths(["SDModelFolder"]),
            LayoutRule::new([ModelCategory::Lora])
                .with_targets(["Models/Lora"])
                .with_config_paths(["SDLoraFolder"]),
        ])
    }

    fn shared_paths(rule: &LayoutRule) -> Vec<String> {
        rule.categories
            .iter()
            .map(|c| format!("/library/Models/{}", c.dir_name()))
            .collect()
    }

    #[test]
    fn test_patch_empty_document() {
        let out = FlatDialect
            .update(
                &PathBuf::from("settings.fds"),
                "",
                &layout(),
                &shared_paths,
                &[],
                &ConfigSharingOptions::default(),
            )
            .unwrap();

        assert!(out.contains("SDModelFolder: /library/Models/Checkpoints\n"));
        assert!(out.contains("SDLoraFolder: /library/Models/Lora\n"));
    }

    #[test]
    fn test_unknown_lines_preserved_verbatim() {
        let existing = "# server settings\nHost: 0.0.0.0\nPort: 7801\n\nSDModelFolder: Models/Stable-Diffusion\n";

        let out = FlatDialect
            .update(
                &PathBuf::from("settings.fds"),
                existing,
                &layout(),
                &shared_paths,
                &[],
                &ConfigSharingOptions::default(),
            )
            .unwrap();

        assert!(out.contains("# server settings\n"));
        assert!(out.contains("Host: 0.0.0.0\n"));
        assert!(out.contains("Port: 7801\n"));
        assert!(out.contains("\n\n"));
        assert!(out.contains("SDModelFolder: /library/Models/Checkpoints\n"));
        assert!(!out.contains("SDModelFolder: Models/Stable-Diffusion"));
    }

    #[test]
    fn test_existing_key_updated_in_place() {
        let existing = "SDLoraFolder: old/value\nOther: keep\n";

        let out = FlatDialect
            .update(
                &PathBuf::from("settings.fds"),
                existing,
                &layout(),
                &shared_paths,
                &[],
                &ConfigSharingOptions::default(),
            )
            .unwrap();

        let lines: Vec<&str> = out.lines().collect();
        // Updated in place, not appended
        assert_eq!(lines[0], "SDLoraFolder: /library/Models/Lora");
        assert_eq!(lines[1], "Other: keep");
    }

    #[test]
    fn test_multi_path_takes_first() {
        let layout = SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Lora, ModelCategory::Hypernetwork])
                .with_targets(["Models/Lora"])
                .with_config_paths(["SDLoraFolder"]),
        ]);

        let out = FlatDialect
            .update(
                &PathBuf::from("settings.fds"),
                "",
                &layout,
                &shared_paths,
                &[],
                &ConfigSharingOptions::default(),
            )
            .unwrap();

        assert_eq!(out, "SDLoraFolder: /library/Models/Lora\n");
    }

    #[test]
    fn test_idempotent() {
        let layout = layout();
        let once = FlatDialect
            .update(
                &PathBuf::from("settings.fds"),
                "User: line\n",
                &layout,
                &shared_paths,
                &[],
                &ConfigSharingOptions::default(),
            )
            .unwrap();
        let twice = FlatDialect
            .update(
                &PathBuf::from("settings.fds"),
                &once,
                &layout,
                &shared_paths,
                &[],
                &ConfigSharingOptions::default(),
            )
            .unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_clear_drops_key() {
        let existing = "SDModelFolder: /library/Models/Checkpoints\nOther: keep\n";
        let out = FlatDialect
            .update(
                &PathBuf::from("settings.fds"),
                existing,
                &SharedFolderLayout::default(),
                &|_| vec![],
                &["SDModelFolder".to_string()],
                &ConfigSharingOptions::default(),
            )
            .unwrap();

        assert_eq!(out, "Other: keep\n");
    }
}
