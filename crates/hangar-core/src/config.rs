//! Centralized configuration constants for the Hangar engine.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for installation pipelines.
pub struct InstallationConfig;

impl InstallationConfig {
    // Package manager timeouts
    pub const PIP_INSTALL_TIMEOUT: Duration = Duration::from_secs(900);
    pub const VENV_CREATION_TIMEOUT: Duration = Duration::from_secs(120);

    // Git operations
    pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(600);
    pub const GIT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

    // Directory deletion retries (locked files on Windows)
    pub const DELETE_RETRY_ATTEMPTS: u32 = 4;
    pub const DELETE_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

    // Bounded pass over nested links left behind by earlier breakage
    pub const MAX_SYMLINK_UNWIND_DEPTH: u32 = 8;
}

/// Process supervision timing.
pub struct ProcessConfig;

impl ProcessConfig {
    /// Grace period between SIGTERM and SIGKILL on shutdown.
    pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
    /// Total budget for a shutdown before it is treated as best-effort done.
    pub const SHUTDOWN_BUDGET: Duration = Duration::from_secs(10);
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const MAX_RETRIES: u32 = 3;
    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const GITHUB_PER_PAGE: u32 = 100;
    pub const GITHUB_MAX_PAGES: u32 = 10;
    pub const GITHUB_CACHE_TTL: Duration = Duration::from_secs(3600);
}

/// Directory layout under the library root.
pub struct PathsConfig;

impl PathsConfig {
    pub const PACKAGES_DIR_NAME: &'static str = "Packages";
    pub const MODELS_DIR_NAME: &'static str = "Models";
    pub const OUTPUTS_DIR_NAME: &'static str = "Outputs";
    pub const CACHE_DIR_NAME: &'static str = "cache";
    pub const PIP_CACHE_DIR_NAME: &'static str = "pip";
    pub const LOGS_DIR_NAME: &'static str = "logs";
    pub const REGISTRY_FILE_NAME: &'static str = "packages.json";
    pub const VENV_DIR_NAME: &'static str = "venv";
}

impl PathsConfig {
    /// Default library root when the caller doesn't supply one:
    /// `<user data dir>/Hangar`, falling back to `./Hangar`.
    pub fn default_library_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Hangar")
    }
}
