//! Error types for the Hangar engine.
//!
//! The taxonomy distinguishes failures that callers retry on a later poll
//! (network), failures that halt a pipeline but keep artifacts on disk for
//! diagnosis (dependency installs), and failures that are logged and
//! tolerated (shutdown timeouts).

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Hangar operations.
#[derive(Debug, Error)]
pub enum HangarError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("GitHub API error: {message}")]
    GitHubApi {
        message: String,
        status_code: Option<u16>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to create symlink from {src} to {dest}: {reason}")]
    SymlinkFailed {
        src: PathBuf,
        dest: PathBuf,
        reason: String,
    },

    /// Existing non-symlink data blocked a link target and could not be
    /// merged into the shared library.
    #[error("Filesystem conflict at {path}: {message}")]
    FilesystemConflict { path: PathBuf, message: String },

    #[error("Directory still locked after {attempts} delete attempts: {path}")]
    DirectoryLocked { path: PathBuf, attempts: u32 },

    // Config patching errors
    #[error("Failed to parse config file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Version management errors
    #[error("Version not found: {tag}")]
    VersionNotFound { tag: String },

    #[error("No releases or branches available for {repo}")]
    NoVersionsAvailable { repo: String },

    #[error("Installation failed: {message}")]
    InstallationFailed { message: String },

    #[error("Installation cancelled by user")]
    InstallationCancelled,

    #[error("Dependency installation failed: {message}")]
    DependencyInstallFailed { message: String },

    #[error("Git {command} failed: {message}")]
    GitFailed { command: String, message: String },

    // Process errors
    #[error("Process launch failed for {package}: {message}")]
    LaunchFailed { package: String, message: String },

    #[error("Process not running: {package}")]
    ProcessNotRunning { package: String },

    /// Non-fatal: the child ignored the terminate signal past the wait
    /// budget. Callers log and proceed.
    #[error("Process {pid} did not exit within {timeout_ms}ms of shutdown request")]
    ShutdownTimeout { pid: u32, timeout_ms: u64 },

    // Registry errors
    #[error("Package not found in registry: {id}")]
    PackageNotFound { id: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Hangar operations.
pub type Result<T> = std::result::Result<T, HangarError>;

// Conversion implementations for common error types

impl From<std::io::Error> for HangarError {
    fn from(err: std::io::Error) -> Self {
        HangarError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for HangarError {
    fn from(err: serde_json::Error) -> Self {
        HangarError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for HangarError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HangarError::Timeout(std::time::Duration::from_secs(0))
        } else {
            HangarError::Network {
                message: err.to_string(),
                cause: Some(err.to_string()),
            }
        }
    }
}

impl HangarError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        HangarError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HangarError::Network { .. } | HangarError::Timeout(_) | HangarError::RateLimited { .. }
        )
    }

    /// Whether a pipeline failure with this error should run registered
    /// cleanup of partially written files.
    ///
    /// Dependency-install failures keep the environment on disk for
    /// diagnosis; cancellation and transient fetch failures clean up.
    pub fn should_cleanup_artifacts(&self) -> bool {
        !matches!(self, HangarError::DependencyInstallFailed { .. })
    }

    /// Whether this error is fatal to an in-progress launch.
    ///
    /// Shutdown timeouts are logged and tolerated so shutdown never hangs
    /// the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HangarError::ShutdownTimeout { .. })
    }
}
