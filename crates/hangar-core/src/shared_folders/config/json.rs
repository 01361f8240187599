//! JSON dialect: structured object-tree settings documents.
//!
//! Single paths are written as strings, multiple paths as arrays, matching
//! what the consuming packages accept in their settings files.

use super::ConfigDialect;
use crate::shared_folders::layout::{ConfigSharingOptions, LayoutRule, SharedFolderLayout};
use crate::{HangarError, Result};
use serde_json::{Map, Value};
use std::path::Path;

pub struct JsonDialect;

impl ConfigDialect for JsonDialect {
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
            let section = match options.root_key {
                Some(ref key) => owned_section(&mut root, key),
                None => &mut root,
            };

            for (config_path, rule) in layout.rules_by_config_path() {
                let paths: Vec<String> = paths_for_rule(&rule)
                    .into_iter()
                    .map(|p| p.replace('\\', "/"))
                    .collect();

                let value = match paths.len() {
                    0 => None,
                    1 => Some(Value::String(paths.into_iter().next().unwrap())),
                    _ => Some(Value::Array(
                        paths.into_iter().map(Value::String).collect(),
                    )),
                };
                set_value(section, &config_path, value);
            }
        }

        for clear_path in clear_paths {
            set_value(&mut root, clear_path, None);
        }

        serde_json::to_string_pretty(&Value::Object(root)).map_err(|e| HangarError::ConfigParse {
            path: path.to_path_buf(),
            message: format!("failed to serialize JSON: {}", e),
        })
    }
}

fn parse_root(path: &Path, content: &str) -> Result<Map<String, Value>> {
    if content.trim().is_empty() {
        return Ok(Map::new());
    }

    let value: Value = serde_json::from_str(content).map_err(|e| HangarError::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(HangarError::ConfigParse {
            path: path.to_path_buf(),
            message: format!("document root is not an object (found {})", other),
        }),
    }
}

fn owned_section<'a>(root: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let needs_insert = !matches!(root.get(key), Some(Value::Object(_)));
    if needs_insert {
        root.insert(key.to_string(), Value::Object(Map::new()));
    }

    match root.get_mut(key) {
        Some(Value::Object(section)) => section,
        _ => unreachable!("section inserted above"),
    }
}

/// Set (or remove, when `value` is `None`) a possibly-dotted key path.
fn set_value(node: &mut Map<String, Value>, dotted_path: &str, value: Option<Value>) {
    let mut parts = dotted_path.splitn(2, '.');
    let head = parts.next().unwrap_or_default();
    let rest = parts.next();

    match rest {
        None => match value {
            Some(v) => {
                node.insert(head.to_string(), v);
            }
            None => {
                node.remove(head);
            }
        },
        Some(rest) => {
            let needs_insert = !matches!(node.get(head), Some(Value::Object(_)));
            if needs_insert {
                if value.is_none() {
                    return;
                }
                node.insert(head.to_string(), Value::Object(Map::new()));
            }
            if let Some(Value::Object(child)) = node.get_mut(head) {
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

    fn layout() -> SharedFolderLayout {
        SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Checkpoint])
                .with_targets(["models/Stable-diffusion"])
                .with_config_paths(["ckpt_dir"]),
            LayoutRule::new([ModelCategory::Lora, ModelCategory::Hypernetwork])
                .with_targets(["models/Lora"])
                .with_config_paths(["lora_dir"]),
        ])
        .with_config(
            "config.json",
            ConfigFormat::Json,
            ConfigSharingOptions::default(),
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
        let layout = layout();
        let out = JsonDialect
            .update(
                &PathBuf::from("config.json"),
                "",
                &layout,
                &shared_paths,
                &[],
                &layout.options,
            )
            .unwrap();

        let value: Value = serde_json::from_str(&out).unwrap();
        // Single category stays a string, multiple become an array
        assert_eq!(value["ckpt_dir"], "/library/Models/Checkpoints");
        assert_eq!(
            value["lora_dir"],
            serde_json::json!(["/library/Models/Lora", "/library/Models/Hypernetworks"])
        );
    }

    #[test]
    fn test_user_keys_preserved() {
        let existing = r#"{"theme": "dark", "ckpt_dir": "models/Stable-diffusion", "samples_save": true}"#;
        let layout = layout();

        let out = JsonDialect
            .update(
                &PathBuf::from("config.json"),
                existing,
                &layout,
                &shared_paths,
                &[],
                &layout.options,
            )
            .unwrap();

        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["theme"], "dark");
        assert_eq!(value["samples_save"], true);
        assert_eq!(value["ckpt_dir"], "/library/Models/Checkpoints");
    }

    #[test]
    fn test_root_key_subsection() {
        let layout = SharedFolderLayout::new(vec![LayoutRule::root().with_config_paths(["model_root"])]);
        let options = ConfigSharingOptions {
            root_key: Some("paths".into()),
            ..Default::default()
        };

        let out = JsonDialect
            .update(
                &PathBuf::from("settings.json"),
                r#"{"network": {"port": 7801}}"#,
                &layout,
                &|_| vec!["/library/Models".to_string()],
                &[],
                &options,
            )
            .unwrap();

        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["paths"]["model_root"], "/library/Models");
        assert_eq!(value["network"]["port"], 7801);
    }

    #[test]
    fn test_malformed_document_is_surfaced() {
        let layout = layout();
        let result = JsonDialect.update(
            &PathBuf::from("config.json"),
            "{not json",
            &layout,
            &shared_paths,
            &[],
            &layout.options,
        );
        assert!(matches!(result, Err(HangarError::ConfigParse { .. })));
    }

    #[test]
    fn test_restore_defaults_round_trip() {
        let layout = layout();
        let patched = JsonDialect
            .update(
                &PathBuf::from("config.json"),
                r#"{"theme": "dark"}"#,
                &layout,
                &shared_paths,
                &[],
                &layout.options,
            )
            .unwrap();

        // Restore: keys point back at package-relative defaults
        let restored = JsonDialect
            .update(
                &PathBuf::from("config.json"),
                &patched,
                &layout,
                &|rule: &LayoutRule| {
                    rule.target_relative_paths
                        .iter()
                        .map(|t| format!("/pkg/{}", t))
                        .collect()
                },
                &[],
                &layout.options,
            )
            .unwrap();

        let value: Value = serde_json::from_str(&restored).unwrap();
        assert_eq!(value["theme"], "dark");
        assert_eq!(value["ckpt_dir"], "/pkg/models/Stable-diffusion");
        assert_eq!(value["lora_dir"], "/pkg/models/Lora");
    }
}
