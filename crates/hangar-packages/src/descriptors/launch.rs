//! Typed launch-option definitions.
//!
//! Each descriptor declares the CLI flags its entry point understands, with
//! defaults that may depend on detected hardware (VRAM class, GPU vendor).
//! User choices are stored per install and converted to argument strings at
//! launch.

use hangar_core::system::{HardwareSnapshot, MemoryLevel};
use serde::{Deserialize, Serialize};

/// Value type of a launch option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchOptionKind {
    Bool,
    Int,
    String,
}

/// How an option's default flag is derived.
#[derive(Debug, Clone)]
pub enum LaunchDefault {
    /// Always on by default.
    Flag(String),
    /// Applied when no NVIDIA GPU is detected (CPU/compatibility flags).
    IfNoNvidia(String),
    /// Selected by the largest detected VRAM class.
    ByVramLevel {
        low: Option<String>,
        medium: Option<String>,
        high: Option<String>,
    },
}

impl LaunchDefault {
    /// Resolve against detected hardware.
    pub fn resolve(&self, hardware: &HardwareSnapshot) -> Option<String> {
        match self {
            LaunchDefault::Flag(flag) => Some(flag.clone()),
            LaunchDefault::IfNoNvidia(flag) => {
                (!hardware.has_nvidia_gpu()).then(|| flag.clone())
            }
            LaunchDefault::ByVramLevel { low, medium, high } => {
                match hardware.max_memory_level()? {
                    MemoryLevel::Low => low.clone(),
                    MemoryLevel::Medium => medium.clone(),
                    MemoryLevel::High => high.clone(),
                }
            }
        }
    }
}

/// One launch option a package's entry point understands.
#[derive(Debug, Clone)]
pub struct LaunchOptionDef {
    /// Display name ("VRAM", "Use CPU only").
    pub name: String,
    pub kind: LaunchOptionKind,
    /// Candidate flags this option can emit.
    pub options: Vec<String>,
    /// Hardware-derived default, if any.
    pub default: Option<LaunchDefault>,
}

impl LaunchOptionDef {
    pub fn bool_flag(name: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: LaunchOptionKind::Bool,
            options: vec![flag.into()],
            default: None,
        }
    }

    pub fn with_default(mut self, default: LaunchDefault) -> Self {
        self.default = Some(default);
        self
    }
}

/// A user's stored choice for one option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchOptionValue {
    /// Flag this value attaches to (e.g. `--port`).
    pub flag: String,
    pub kind: LaunchOptionKind,
    /// `None` for enabled bool flags; the literal value otherwise.
    #[serde(default)]
    pub value: Option<String>,
}

impl LaunchOptionValue {
    /// Convert to argument strings for the process command line.
    pub fn to_args(&self) -> Vec<String> {
        match (self.kind, &self.value) {
            (LaunchOptionKind::Bool, _) => vec![self.flag.clone()],
            (_, Some(value)) => vec![self.flag.clone(), value.clone()],
            (_, None) => vec![],
        }
    }
}

/// Compute the default argument list for a descriptor's options.
pub fn default_args(
    options: &[LaunchOptionDef],
    hardware: &HardwareSnapshot,
) -> Vec<String> {
    options
        .iter()
        .filter_map(|def| def.default.as_ref().and_then(|d| d.resolve(hardware)))
        .collect()
}
