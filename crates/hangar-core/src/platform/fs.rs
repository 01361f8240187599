//! Filesystem helpers: directory links and retried deletion.

use crate::config::InstallationConfig;
use crate::{HangarError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Create a directory link from `link` to `target`.
///
/// Uses a directory symlink on Unix and a directory symbolic link on
/// Windows (requires developer mode or elevation; the junction-style link
/// is what upstream packages expect for model folders). The parent of
/// `link` is created if missing.
pub fn create_dir_link(link: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| HangarError::io_with_path(e, parent.to_path_buf()))?;
    }

    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(target, link);

    #[cfg(windows)]
    let result = std::os::windows::fs::symlink_dir(target, link);

    #[cfg(not(any(unix, windows)))]
    let result: std::io::Result<()> = Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks not supported on this platform",
    ));

    result.map_err(|e| HangarError::SymlinkFailed {
        src: target.to_path_buf(),
        dest: link.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Whether the path is a symlink (including broken links).
pub fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Resolve a symlink's target, if the path is one.
pub fn link_target(path: &Path) -> Option<std::path::PathBuf> {
    std::fs::read_link(path).ok()
}

/// Remove a directory tree with bounded retry and exponential backoff.
///
/// Directory deletion can fail transiently when another process (antivirus,
/// indexer, a just-killed child) still holds a handle. After the final
/// attempt the error surfaces as `DirectoryLocked`.
pub async fn remove_dir_all_with_retry(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let attempts = InstallationConfig::DELETE_RETRY_ATTEMPTS;
    let base_delay = InstallationConfig::DELETE_RETRY_BASE_DELAY;

    for attempt in 0..attempts {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                debug!("Removed directory {}", path.display());
                return Ok(());
            }
            Err(e) if attempt + 1 < attempts => {
                let delay = base_delay * 2u32.pow(attempt);
                warn!(
                    "Failed to remove {} (attempt {}/{}): {}. Retrying in {:?}",
                    path.display(),
                    attempt + 1,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(
                    "Giving up removing {} after {} attempts: {}",
                    path.display(),
                    attempts,
                    e
                );
                return Err(HangarError::DirectoryLocked {
                    path: path.to_path_buf(),
                    attempts,
                });
            }
        }
    }

    Ok(())
}
