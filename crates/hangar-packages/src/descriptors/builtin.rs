//! Built-in package descriptors.
//!
//! Each function builds the capability record for one supported upstream
//! project. The records encode upstream conventions as data: directory
//! layouts, config dialects, readiness phrases, and launch flags.

use super::launch::{LaunchDefault, LaunchOptionDef, LaunchOptionKind};
use super::PackageDescriptor;
use hangar_core::shared_folders::{
    ConfigDefaultMode, ConfigFormat, ConfigSharingOptions, LayoutRule, ModelCategory,
    SharedFolderLayout, SharedFolderStrategy,
};
use hangar_core::system::Accelerator;

/// All built-in descriptors.
pub fn all() -> Vec<PackageDescriptor> {
    vec![
        comfy_ui(),
        sd_web_ui(),
        sd_web_ui_forge(),
        fooocus(),
        swarm_ui(),
    ]
}

/// Find a descriptor by id.
pub fn find(id: &str) -> Option<PackageDescriptor> {
    all().into_iter().find(|d| d.id == id)
}

/// ComfyUI: node-graph backend. Tags no releases worth tracking; installs
/// follow the master branch. Model paths go through
/// `extra_model_paths.yaml`, so config patching is recommended over links.
pub fn comfy_ui() -> PackageDescriptor {
    PackageDescriptor {
        id: "comfyui".into(),
        display_name: "ComfyUI".into(),
        author: "comfyanonymous".into(),
        repo_name: "ComfyUI".into(),
        blurb: "A powerful and modular stable diffusion GUI and backend".into(),
        main_branch: "master".into(),
        ignores_release_tags: true,
        supports_extensions: true,
        extensions_dir: Some("custom_nodes".into()),
        supported_accelerators: vec![
            Accelerator::Cpu,
            Accelerator::Cuda,
            Accelerator::Rocm,
            Accelerator::DirectMl,
            Accelerator::Mps,
        ],
        preferred_accelerator: None,
        entry_point: "main.py".into(),
        default_args: vec![],
        launch_options: vec![
            LaunchOptionDef {
                name: "VRAM".into(),
                kind: LaunchOptionKind::Bool,
                options: vec![
                    "--highvram".into(),
                    "--normalvram".into(),
                    "--lowvram".into(),
                    "--novram".into(),
                ],
                default: Some(LaunchDefault::ByVramLevel {
                    low: Some("--lowvram".into()),
                    medium: Some("--normalvram".into()),
                    high: None,
                }),
            },
            LaunchOptionDef::bool_flag("Use CPU only", "--cpu")
                .with_default(LaunchDefault::IfNoNvidia("--cpu".into())),
            LaunchOptionDef::bool_flag("Disable xformers", "--disable-xformers")
                .with_default(LaunchDefault::IfNoNvidia("--disable-xformers".into())),
            LaunchOptionDef::bool_flag("Auto-Launch", "--auto-launch"),
        ],
        readiness_phrases: vec!["To see the GUI go to".into()],
        default_url: Some("http://127.0.0.1:8188".into()),
        shared_folders: SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Checkpoint])
                .with_targets(["models/checkpoints"])
                .with_config_paths(["checkpoints"]),
            LayoutRule::new([ModelCategory::Diffuser])
                .with_targets(["models/diffusers"])
                .with_config_paths(["diffusers"]),
            LayoutRule::new([ModelCategory::Lora])
                .with_targets(["models/loras"])
                .with_config_paths(["loras"]),
            LayoutRule::new([ModelCategory::ClipModel])
                .with_targets(["models/clip"])
                .with_config_paths(["clip"]),
            LayoutRule::new([ModelCategory::ClipVision])
                .with_targets(["models/clip_vision"])
                .with_config_paths(["clip_vision"]),
            LayoutRule::new([ModelCategory::Embedding])
                .with_targets(["models/embeddings"])
                .with_config_paths(["embeddings"]),
            LayoutRule::new([ModelCategory::Vae])
                .with_targets(["models/vae"])
                .with_config_paths(["vae"]),
            LayoutRule::new([ModelCategory::ApproxVae])
                .with_targets(["models/vae_approx"])
                .with_config_paths(["vae_approx"]),
            LayoutRule::new([ModelCategory::ControlNet])
                .with_targets(["models/controlnet"])
                .with_config_paths(["controlnet"]),
            LayoutRule::new([ModelCategory::Gligen])
                .with_targets(["models/gligen"])
                .with_config_paths(["gligen"]),
            LayoutRule::new([ModelCategory::Upscaler])
                .with_targets(["models/upscale_models"])
                .with_config_paths(["upscale_models"]),
            LayoutRule::new([ModelCategory::Hypernetwork])
                .with_targets(["models/hypernetworks"])
                .with_config_paths(["hypernetworks"]),
        ])
        .with_config(
            "extra_model_paths.yaml",
            ConfigFormat::Yaml,
            ConfigSharingOptions {
                root_key: Some("hangar".into()),
                default_mode: ConfigDefaultMode::ClearRoot,
            },
        ),
        shared_output_paths: vec!["output".into()],
        recommended_strategy: SharedFolderStrategy::ConfigPatch,
    }
}

/// Stable Diffusion WebUI (AUTOMATIC1111). Release-tagged; model dirs are
/// plain folders, so links are the recommended strategy.
pub fn sd_web_ui() -> PackageDescriptor {
    PackageDescriptor {
        id: "sd-webui".into(),
        display_name: "Stable Diffusion WebUI".into(),
        author: "AUTOMATIC1111".into(),
        repo_name: "stable-diffusion-webui".into(),
        blurb: "A browser interface based on Gradio library for Stable Diffusion".into(),
        main_branch: "master".into(),
        ignores_release_tags: false,
        supports_extensions: true,
        extensions_dir: Some("extensions".into()),
        supported_accelerators: vec![
            Accelerator::Cpu,
            Accelerator::Cuda,
            Accelerator::Rocm,
            Accelerator::Mps,
        ],
        preferred_accelerator: None,
        entry_point: "launch.py".into(),
        default_args: vec![],
        launch_options: vec![
            LaunchOptionDef {
                name: "VRAM".into(),
                kind: LaunchOptionKind::Bool,
                options: vec!["--lowvram".into(), "--medvram".into()],
                default: Some(LaunchDefault::ByVramLevel {
                    low: Some("--lowvram".into()),
                    medium: Some("--medvram".into()),
                    high: None,
                }),
            },
            LaunchOptionDef::bool_flag("Skip Torch CUDA test", "--skip-torch-cuda-test")
                .with_default(LaunchDefault::IfNoNvidia("--skip-torch-cuda-test".into())),
            LaunchOptionDef::bool_flag("Disable xformers", "--disable-xformers"),
            LaunchOptionDef {
                name: "Port".into(),
                kind: LaunchOptionKind::Int,
                options: vec!["--port".into()],
                default: None,
            },
        ],
        readiness_phrases: vec!["Running on local URL".into()],
        default_url: Some("http://127.0.0.1:7860".into()),
        shared_folders: SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Checkpoint])
                .with_targets(["models/Stable-diffusion"]),
            LayoutRule::new([ModelCategory::Diffuser]).with_targets(["models/diffusers"]),
            LayoutRule::new([ModelCategory::Vae]).with_targets(["models/VAE"]),
            LayoutRule::new([ModelCategory::ApproxVae]).with_targets(["models/VAE-approx"]),
            LayoutRule::new([ModelCategory::Lora])
                .with_targets(["models/Lora"]),
            LayoutRule::new([ModelCategory::Embedding]).with_targets(["embeddings"]),
            LayoutRule::new([ModelCategory::Hypernetwork]).with_targets(["models/hypernetworks"]),
            LayoutRule::new([ModelCategory::ControlNet]).with_targets(["models/ControlNet"]),
            LayoutRule::new([ModelCategory::Upscaler]).with_targets(["models/ESRGAN"]),
        ]),
        shared_output_paths: vec!["outputs".into()],
        recommended_strategy: SharedFolderStrategy::Symlink,
    }
}

/// WebUI Forge: a fork of the AUTOMATIC1111 WebUI with a reworked backend.
/// Same layout and launch surface; tracks its main branch instead of
/// releases.
pub fn sd_web_ui_forge() -> PackageDescriptor {
    let mut descriptor = PackageDescriptor::fork_of(
        &sd_web_ui(),
        "sd-webui-forge",
        "Stable Diffusion WebUI Forge",
        "lllyasviel",
        "stable-diffusion-webui-forge",
    );
    descriptor.blurb =
        "An optimized fork of Stable Diffusion WebUI with a rewritten backend".into();
    descriptor.main_branch = "main".into();
    descriptor.ignores_release_tags = true;
    descriptor
}

/// Fooocus: reads every model path from `config.json`, including a
/// template inpainting cache with no library counterpart.
pub fn fooocus() -> PackageDescriptor {
    PackageDescriptor {
        id: "fooocus".into(),
        display_name: "Fooocus".into(),
        author: "lllyasviel".into(),
        repo_name: "Fooocus".into(),
        blurb: "Focus on prompting and generating".into(),
        main_branch: "main".into(),
        ignores_release_tags: false,
        supports_extensions: false,
        extensions_dir: None,
        supported_accelerators: vec![
            Accelerator::Cpu,
            Accelerator::Cuda,
            Accelerator::Rocm,
            Accelerator::Mps,
        ],
        preferred_accelerator: None,
        entry_point: "launch.py".into(),
        default_args: vec![],
        launch_options: vec![
            LaunchOptionDef::bool_flag("Always offload VRAM", "--always-offload-from-vram")
                .with_default(LaunchDefault::ByVramLevel {
                    low: Some("--always-offload-from-vram".into()),
                    medium: None,
                    high: None,
                }),
            LaunchOptionDef::bool_flag("Disable offload", "--disable-offload-from-vram"),
        ],
        readiness_phrases: vec!["Use the app with".into()],
        default_url: Some("http://127.0.0.1:7865".into()),
        shared_folders: SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Checkpoint])
                .with_targets(["models/checkpoints"])
                .with_config_paths(["path_checkpoints"]),
            LayoutRule::new([ModelCategory::Lora])
                .with_targets(["models/loras"])
                .with_config_paths(["path_loras"]),
            LayoutRule::new([ModelCategory::Embedding])
                .with_targets(["models/embeddings"])
                .with_config_paths(["path_embeddings"]),
            LayoutRule::new([ModelCategory::ApproxVae])
                .with_targets(["models/vae_approx"])
                .with_config_paths(["path_vae_approx"]),
            LayoutRule::new([ModelCategory::Upscaler])
                .with_targets(["models/upscale_models"])
                .with_config_paths(["path_upscale_models"]),
            LayoutRule::new([ModelCategory::ControlNet])
                .with_targets(["models/controlnet"])
                .with_config_paths(["path_controlnet"]),
            LayoutRule::new([ModelCategory::ClipVision])
                .with_targets(["models/clip_vision"])
                .with_config_paths(["path_clip_vision"]),
            // Template inpainting cache: a fixed location with no library
            // category behind it
            LayoutRule::default()
                .with_targets(["models/inpaint"])
                .with_config_paths(["path_inpaint"]),
        ])
        .with_config(
            "config.json",
            ConfigFormat::Json,
            ConfigSharingOptions::default(),
        ),
        shared_output_paths: vec!["outputs".into()],
        recommended_strategy: SharedFolderStrategy::ConfigPatch,
    }
}

/// SwarmUI: stores model paths in its flat `Data/Settings.fds` document and
/// accepts a single model-root binding.
pub fn swarm_ui() -> PackageDescriptor {
    PackageDescriptor {
        id: "swarm-ui".into(),
        display_name: "SwarmUI".into(),
        author: "mcmonkeyprojects".into(),
        repo_name: "SwarmUI".into(),
        blurb: "A modular AI image generation web UI with a managed backend".into(),
        main_branch: "master".into(),
        ignores_release_tags: false,
        supports_extensions: false,
        extensions_dir: None,
        supported_accelerators: vec![Accelerator::Cpu, Accelerator::Cuda, Accelerator::Rocm],
        preferred_accelerator: None,
        entry_point: "launchtools/launch.py".into(),
        default_args: vec![],
        launch_options: vec![LaunchOptionDef {
            name: "Host".into(),
            kind: LaunchOptionKind::String,
            options: vec!["--host".into()],
            default: None,
        }],
        readiness_phrases: vec!["Starting webserver".into()],
        default_url: Some("http://127.0.0.1:7801".into()),
        shared_folders: SharedFolderLayout::new(vec![
            // The whole library root binds to one key; per-category keys
            // refine lookups within it
            LayoutRule::root().with_config_paths(["Paths.ModelRoot"]),
            LayoutRule::new([ModelCategory::Checkpoint])
                .with_targets(["Models/Stable-Diffusion"])
                .with_config_paths(["Paths.SDModelFolder"]),
            LayoutRule::new([ModelCategory::Lora])
                .with_targets(["Models/Lora"])
                .with_config_paths(["Paths.SDLoraFolder"]),
            LayoutRule::new([ModelCategory::Vae])
                .with_targets(["Models/VAE"])
                .with_config_paths(["Paths.SDVAEFolder"]),
            LayoutRule::new([ModelCategory::Embedding])
                .with_targets(["Models/Embeddings"])
                .with_config_paths(["Paths.SDEmbeddingFolder"]),
            LayoutRule::new([ModelCategory::ControlNet])
                .with_targets(["Models/controlnet"])
                .with_config_paths(["Paths.SDControlNetsFolder"]),
            LayoutRule::new([ModelCategory::ClipVision])
                .with_targets(["Models/clip_vision"])
                .with_config_paths(["Paths.SDClipVisionFolder"]),
        ])
        .with_config(
            "Data/Settings.fds",
            ConfigFormat::Flat,
            ConfigSharingOptions::default(),
        ),
        shared_output_paths: vec!["Output".into()],
        recommended_strategy: SharedFolderStrategy::ConfigPatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let descriptors = all();
        let mut seen = std::collections::HashSet::new();
        for descriptor in &descriptors {
            assert!(seen.insert(descriptor.id.clone()), "duplicate id {}", descriptor.id);
        }
    }

    #[test]
    fn test_find() {
        assert!(find("comfyui").is_some());
        assert!(find("sd-webui-forge").is_some());
        assert!(find("unknown-package").is_none());
    }

    #[test]
    fn test_config_patch_descriptors_declare_config() {
        for descriptor in all() {
            if descriptor.recommended_strategy == SharedFolderStrategy::ConfigPatch {
                assert!(
                    descriptor.shared_folders.config_path.is_some(),
                    "{} recommends config patching but declares no config file",
                    descriptor.id
                );
                assert!(descriptor.shared_folders.config_format.is_some());
            }
        }
    }

    #[test]
    fn test_extension_support_declares_directory() {
        for descriptor in all() {
            assert_eq!(
                descriptor.supports_extensions,
                descriptor.extensions_dir.is_some(),
                "{} extension capability and directory disagree",
                descriptor.id
            );
        }
    }

    #[test]
    fn test_every_descriptor_has_readiness_phrase() {
        for descriptor in all() {
            assert!(
                !descriptor.readiness_phrases.is_empty(),
                "{} has no readiness phrase",
                descriptor.id
            );
        }
    }

    #[test]
    fn test_swarm_root_rule() {
        let descriptor = swarm_ui();
        let root_rules: Vec<_> = descriptor
            .shared_folders
            .rules
            .iter()
            .filter(|r| r.is_root)
            .collect();
        assert_eq!(root_rules.len(), 1);
        assert_eq!(root_rules[0].config_document_paths, vec!["Paths.ModelRoot"]);
    }
}
