//! YAML dialect: block-indented hierarchical documents.
//!
//! Used for extra-model-path files where the upstream package expects one
//! top-level mapping per path provider and newline-joined multi-paths.

use super::ConfigDialect;
use crate::shared_folders::layout::{ConfigSharingOptions, LayoutRule, SharedFolderLayout};
use crate::{HangarError, Result};
use serde_yaml::{Mapping, Value};
use std::path::Path;

pub struct YamlDialect;

impl ConfigDialect for YamlDialect {
    fn update(
        &self,
        path: &Path,
        content: &str,
        layout: &SharedFolderLayout,
        paths_for_rule: &dyn Fn(&LayoutRule) -> Vec<String>,
        clear_paths: &[String],
        options: &ConfigSharingOptions,
    ) -> Result<String> {
        let mut root = parse_root(path, content)?;

        {
            // Operate within the owned subsection when a root key is set
            let section = match options.root_key {
                Some(ref key) => owned_section(&mut root, key),
                None => &mut root,
            };

            for (config_path, rule) in layout.rules_by_config_path() {
                let paths = paths_for_rule(&rule);
                let value = if paths.is_empty() {
                    None
                } else {
                    // Newline-joined multi-line scalar, the convention the
                    // consuming packages parse
                    let joined = paths
                        .iter()
                        .map(|p| p.replace('\\', "/"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    Some(Value::String(joined))
                };
                set_value(section, &config_path, value);
            }
        }

        for clear_path in clear_paths {
            set_value(&mut root, clear_path, None);
        }

        serde_yaml::to_string(&Value::Mapping(root)).map_err(|e| HangarError::ConfigParse {
            path: path.to_path_buf(),
            message: format!("failed to serialize YAML: {}", e),
        })
    }
}

fn parse_root(path: &Path, content: &str) -> Result<Mapping> {
    if content.trim().is_empty() {
        return Ok(Mapping::new());
    }

    let value: Value = serde_yaml::from_str(content).map_err(|e| HangarError::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        other => Err(HangarError::ConfigParse {
            path: path.to_path_buf(),
            message: format!("document root is not a mapping (found {:?})", other),
        }),
    }
}

/// Find or create the engine-owned mapping under `key`, replacing a
/// non-mapping occupant.
fn owned_section<'a>(root: &'a mut Mapping, key: &str) -> &'a mut Mapping {
    let key_value = Value::String(key.to_string());

    let needs_insert = !matches!(root.get(&key_value), Some(Value::Mapping(_)));
    if needs_insert {
        root.insert(key_value.clone(), Value::Mapping(Mapping::new()));
    }

    match root.get_mut(&key_value) {
        Some(Value::Mapping(section)) => section,
        _ => unreachable!("section inserted above"),
    }
}

/// Set (or remove, when `value` is `None`) a possibly-dotted key path.
fn set_value(node: &mut Mapping, dotted_path: &str, value: Option<Value>) {
    let mut parts = dotted_path.splitn(2, '.');
    let head = parts.next().unwrap_or_default();
    let rest = parts.next();

    let head_key = Value::String(head.to_string());

    match rest {
        None => match value {
            Some(v) => {
                node.insert(head_key, v);
            }
            None => {
                node.remove(&head_key);
            }
        },
        Some(rest) => {
            let needs_insert = !matches!(node.get(&head_key), Some(Value::Mapping(_)));
            if needs_insert {
                if value.is_none() {
                    // Nothing to clear under a missing branch
                    return;
                }
                node.insert(head_key.clone(), Value::Mapping(Mapping::new()));
            }
            if let Some(Value::Mapping(child)) = node.get_mut(&head_key) {
                set_value(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_folders::layout::{ConfigFormat, LayoutRule, ModelCategory};
    use std::path::PathBuf;

    fn layout_with_root_key() -> SharedFolderLayout {
        SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Checkpoint])
                .with_targets(["models/checkpoints"])
                .with_config_paths(["checkpoints"]),
            LayoutRule::new([ModelCategory::Lora, ModelCategory::Hypernetwork])
                .with_targets(["models/loras"])
                .with_config_paths(["loras"]),
        ])
        .with_config(
            "extra_model_paths.yaml",
            ConfigFormat::Yaml,
            ConfigSharingOptions {
                root_key: Some("hangar".into()),
                ..Default::default()
            },
        )
    }

    fn shared_paths(rule: &LayoutRule) -> Vec<String> {
        rule.categories
            .iter()
            .map(|c| format!("/library/Models/{}", c.dir_name()))
            .collect()
    }

    #[test]
    fn test_patch_empty_document() {
        let layout = layout_with_root_key();
        let out = YamlDialect
            .update(
                &PathBuf::from("x.yaml"),
                "",
                &layout,
                &shared_paths,
                &[],
                &layout.options,
            )
            .unwrap();

        let value: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        let section = &value["hangar"];
        assert_eq!(
            section["checkpoints"].as_str().unwrap(),
            "/library/Models/Checkpoints"
        );
        // Two categories newline-joined
        assert_eq!(
            section["loras"].as_str().unwrap(),
            "/library/Models/Lora\n/library/Models/Hypernetworks"
        );
    }

    #[test]
    fn test_sibling_sections_preserved() {
        let existing = "comfyui:\n  base_path: /opt/comfy\n  checkpoints: models/checkpoints\n";
        let layout = layout_with_root_key();

        let out = YamlDialect
            .update(
                &PathBuf::from("x.yaml"),
                existing,
                &layout,
                &shared_paths,
                &[],
                &layout.options,
            )
            .unwrap();

        let value: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(value["comfyui"]["base_path"].as_str().unwrap(), "/opt/comfy");
        assert!(value["hangar"]["checkpoints"].is_string());
    }

    #[test]
    fn test_zero_change_round_trip_is_semantically_equal() {
        let existing = "hangar:\n  checkpoints: /library/Models/Checkpoints\n  loras: |-\n    /library/Models/Lora\n    /library/Models/Hypernetworks\nother: keep\n";
        let layout = layout_with_root_key();

        let out = YamlDialect
            .update(
                &PathBuf::from("x.yaml"),
                existing,
                &layout,
                &shared_paths,
                &[],
                &layout.options,
            )
            .unwrap();

        let before: serde_yaml::Value = serde_yaml::from_str(existing).unwrap();
        let after: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_malformed_document_is_surfaced() {
        let layout = layout_with_root_key();
        let result = YamlDialect.update(
            &PathBuf::from("x.yaml"),
            "not: [valid: yaml",
            &layout,
            &shared_paths,
            &[],
            &layout.options,
        );
        assert!(matches!(result, Err(HangarError::ConfigParse { .. })));
    }

    #[test]
    fn test_scalar_root_is_an_error() {
        let layout = layout_with_root_key();
        let result = YamlDialect.update(
            &PathBuf::from("x.yaml"),
            "just a string",
            &layout,
            &shared_paths,
            &[],
            &layout.options,
        );
        assert!(matches!(result, Err(HangarError::ConfigParse { .. })));
    }

    #[test]
    fn test_clear_paths_removes_root_key() {
        let existing = "hangar:\n  checkpoints: /x\nuser_key: 1\n";
        let layout = SharedFolderLayout::default();
        let options = ConfigSharingOptions {
            root_key: Some("hangar".into()),
            ..Default::default()
        };

        let out = YamlDialect
            .update(
                &PathBuf::from("x.yaml"),
                existing,
                &layout,
                &|_| vec![],
                &["hangar".to_string()],
                &options,
            )
            .unwrap();

        let value: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        assert!(value.get("hangar").map(|v| v.is_null()).unwrap_or(true) || value.get("hangar").is_none());
        assert_eq!(value["user_key"].as_u64().unwrap(), 1);
    }

    #[test]
    fn test_dotted_path_navigation() {
        let layout = SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Vae])
                .with_targets(["models/vae"])
                .with_config_paths(["paths.vae_dir"]),
        ]);
        let options = ConfigSharingOptions::default();

        let out = YamlDialect
            .update(
                &PathBuf::from("x.yaml"),
                "",
                &layout,
                &shared_paths,
                &[],
                &options,
            )
            .unwrap();

        let value: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(
            value["paths"]["vae_dir"].as_str().unwrap(),
            "/library/Models/VAE"
        );
    }
}
