//! Symlink reconciliation for shared model folders.
//!
//! Creates directory links from a package's model directories into the
//! shared library. Existing real directories are merged upward into the
//! library before being replaced by a link, so user data survives prior
//! bugs and manual edits. Stale and chained links are removed.

use crate::config::InstallationConfig;
use crate::platform::fs::{create_dir_link, is_symlink, link_target};
use crate::shared_folders::layout::{LayoutRule, SharedFolderLayout};
use crate::{HangarError, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Create or update links for every rule in the layout.
pub async fn apply_links(
    layout: &SharedFolderLayout,
    package_root: &Path,
    library_root: &Path,
) -> Result<()> {
    // Sweep broken links left by earlier runs before reconciling, so a
    // dangling link never masquerades as an existing target.
    remove_orphaned_links(layout, package_root).await?;

    for rule in &layout.rules {
        if rule.is_root {
            // Root binding only makes sense for config patching
            continue;
        }

        for target_rel in &rule.target_relative_paths {
            let dest = package_root.join(target_rel);

            match rule.categories.first() {
                Some(category) => {
                    let mut source = library_root.join(category.dir_name());
                    if let Some(ref sub) = rule.source_sub_path {
                        source = source.join(sub);
                    }
                    create_or_update_link(&source, &dest).await?;
                }
                None => {
                    // Category-less rule: fixed template location with no
                    // library counterpart; just make sure the dir exists.
                    tokio::fs::create_dir_all(&dest)
                        .await
                        .map_err(|e| HangarError::io_with_path(e, dest.clone()))?;
                }
            }
        }
    }

    Ok(())
}

/// Scan the layout's target parent directories for broken links and remove
/// them.
///
/// Bounded to the directories the layout manages (never the whole package
/// tree) so a venv full of files is not walked on every apply.
pub async fn remove_orphaned_links(
    layout: &SharedFolderLayout,
    package_root: &Path,
) -> Result<()> {
    let mut scanned: std::collections::HashSet<PathBuf> = std::collections::HashSet::new();

    for rule in &layout.rules {
        for target_rel in &rule.target_relative_paths {
            let parent = match package_root.join(target_rel).parent() {
                Some(parent) if parent.starts_with(package_root) => parent.to_path_buf(),
                _ => continue,
            };
            if !parent.is_dir() || !scanned.insert(parent.clone()) {
                continue;
            }

            for entry in walkdir::WalkDir::new(&parent)
                .max_depth(2)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if entry.path_is_symlink() && resolve_link_chain(path).is_none() {
                    warn!("Removing orphaned link {}", path.display());
                    remove_link(path).await?;
                }
            }
        }
    }

    Ok(())
}

/// Remove links created by `apply_links`.
///
/// Only link targets are deleted; a real directory occupying a target is
/// left untouched. After this pass no rule target dangles.
pub async fn remove_links(layout: &SharedFolderLayout, package_root: &Path) -> Result<()> {
    for rule in &layout.rules {
        for target_rel in &rule.target_relative_paths {
            let dest = package_root.join(target_rel);
            remove_if_link(&dest).await?;
        }
    }
    Ok(())
}

/// Creates or updates a directory link from `dest` to `source`.
///
/// Moves destination files up to the source if a real directory exists at
/// the destination.
pub async fn create_or_update_link(source: &Path, dest: &Path) -> Result<()> {
    // Create the library-side source if it doesn't exist yet
    if !source.exists() {
        info!("Creating link source {}", source.display());
        tokio::fs::create_dir_all(source)
            .await
            .map_err(|e| HangarError::io_with_path(e, source.to_path_buf()))?;
    }

    // A parent that is itself a stale link must become a real directory
    // before we can place anything under it.
    if let Some(parent) = dest.parent() {
        if is_symlink(parent) {
            info!("Deleting parent link at {}", parent.display());
            remove_link(parent).await?;
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HangarError::io_with_path(e, parent.to_path_buf()))?;
        }
    }

    if dest.symlink_metadata().is_ok() {
        if is_symlink(dest) {
            match resolve_link_chain(dest) {
                Some(final_target) if final_target == source => {
                    if link_target(dest).map(|t| t == source).unwrap_or(false) {
                        debug!(
                            "Skipped updating matching folder link ({} -> {})",
                            dest.display(),
                            source.display()
                        );
                        return Ok(());
                    }
                    // Chained link that lands on the right place; relink
                    // directly so later passes see a single hop.
                    info!("Flattening chained link at {}", dest.display());
                    remove_link(dest).await?;
                }
                _ => {
                    info!("Deleting stale link at {}", dest.display());
                    remove_link(dest).await?;
                }
            }
        } else {
            // Real directory in the way: merge its contents upward, then
            // delete the emptied directory.
            let has_entries = std::fs::read_dir(dest)
                .map(|mut it| it.next().is_some())
                .unwrap_or(false);
            if has_entries {
                info!(
                    "Moving files from {} to {}",
                    dest.display(),
                    source.display()
                );
                merge_dir_up(dest, source).await?;
            }

            debug!("Deleting emptied folder at {}", dest.display());
            tokio::fs::remove_dir_all(dest)
                .await
                .map_err(|e| HangarError::io_with_path(e, dest.to_path_buf()))?;
        }
    }

    info!(
        "Updating folder link {} -> {}",
        dest.display(),
        source.display()
    );
    create_dir_link(dest, source)
}

/// Move everything under `from` into `to`, preserving data.
///
/// - Symlinks found inside `from` are removed (duplicate/orphaned links
///   from earlier runs), never followed.
/// - A file already present in `to` with identical content drops the copy
///   in `from`; differing content is moved under a deduplicated name so
///   nothing is silently lost.
async fn merge_dir_up(from: &Path, to: &Path) -> Result<()> {
    tokio::fs::create_dir_all(to)
        .await
        .map_err(|e| HangarError::io_with_path(e, to.to_path_buf()))?;

    let entries = std::fs::read_dir(from)
        .map_err(|e| HangarError::io_with_path(e, from.to_path_buf()))?;

    for entry in entries {
        let entry = entry.map_err(|e| HangarError::io_with_path(e, from.to_path_buf()))?;
        let path = entry.path();
        let dest = to.join(entry.file_name());

        if is_symlink(&path) {
            debug!("Removing nested link during merge: {}", path.display());
            remove_link(&path).await?;
            continue;
        }

        let file_type = entry
            .file_type()
            .map_err(|e| HangarError::io_with_path(e, path.clone()))?;

        if file_type.is_dir() {
            Box::pin(merge_dir_up(&path, &dest)).await?;
            tokio::fs::remove_dir(&path)
                .await
                .map_err(|e| HangarError::io_with_path(e, path.clone()))?;
            continue;
        }

        if dest.exists() {
            if files_identical(&path, &dest)? {
                debug!("Dropping duplicate {} (same hash)", path.display());
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| HangarError::io_with_path(e, path.clone()))?;
                continue;
            }

            let renamed = dedup_name(&dest);
            warn!(
                "Conflicting file {} differs from library copy; keeping both as {}",
                path.display(),
                renamed.display()
            );
            move_file(&path, &renamed).await?;
            continue;
        }

        move_file(&path, &dest).await?;
    }

    Ok(())
}

/// Rename across devices falls back to copy+delete.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to)
                .await
                .map_err(|e| HangarError::io_with_path(e, to.to_path_buf()))?;
            tokio::fs::remove_file(from)
                .await
                .map_err(|e| HangarError::io_with_path(e, from.to_path_buf()))?;
            Ok(())
        }
    }
}

fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = std::fs::metadata(a).map_err(|e| HangarError::io_with_path(e, a.to_path_buf()))?;
    let meta_b = std::fs::metadata(b).map_err(|e| HangarError::io_with_path(e, b.to_path_buf()))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(file_sha256(a)? == file_sha256(b)?)
}

fn file_sha256(path: &Path) -> Result<String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| HangarError::io_with_path(e, path.to_path_buf()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .map_err(|e| HangarError::io_with_path(e, path.to_path_buf()))?;
    Ok(hex::encode(hasher.finalize()))
}

fn dedup_name(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| format!(".{}", s.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for n in 1..1000 {
        let candidate = parent.join(format!("{}-{}{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
    }
    parent.join(format!("{}-conflict{}", stem, ext))
}

/// Follow a link chain up to the configured bound, returning the final
/// non-link target. `None` on a broken chain or when the bound is hit
/// (defends against cycles left by earlier breakage).
fn resolve_link_chain(path: &Path) -> Option<PathBuf> {
    let mut current = path.to_path_buf();
    for _ in 0..InstallationConfig::MAX_SYMLINK_UNWIND_DEPTH {
        if !is_symlink(&current) {
            return current.exists().then_some(current);
        }
        current = link_target(&current)?;
    }
    None
}

async fn remove_if_link(path: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() && is_symlink(path) {
        info!("Deleting folder link {}", path.display());
        remove_link(path).await?;
    }
    Ok(())
}

/// Remove a symlink itself (directory-style on Windows, file-style on Unix).
async fn remove_link(path: &Path) -> Result<()> {
    #[cfg(windows)]
    let result = tokio::fs::remove_dir(path).await;

    #[cfg(not(windows))]
    let result = tokio::fs::remove_file(path).await;

    result.map_err(|e| HangarError::io_with_path(e, path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_folders::layout::{LayoutRule, ModelCategory, SharedFolderLayout};
    use tempfile::TempDir;

    fn lora_layout() -> SharedFolderLayout {
        SharedFolderLayout::new(vec![
            LayoutRule::new([ModelCategory::Lora]).with_targets(["models/loras"])
        ])
    }

    #[tokio::test]
    async fn test_apply_creates_link_to_library_category() {
        let temp = TempDir::new().unwrap();
        let package_root = temp.path().join("pkg");
        let library_root = temp.path().join("lib");
        std::fs::create_dir_all(&package_root).unwrap();

        apply_links(&lora_layout(), &package_root, &library_root)
            .await
            .unwrap();

        let link = package_root.join("models/loras");
        assert!(is_symlink(&link));
        assert_eq!(link_target(&link).unwrap(), library_root.join("Lora"));
        assert!(library_root.join("Lora").is_dir());
    }

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let package_root = temp.path().join("pkg");
        let library_root = temp.path().join("lib");
        std::fs::create_dir_all(&package_root).unwrap();

        apply_links(&lora_layout(), &package_root, &library_root)
            .await
            .unwrap();
        let link = package_root.join("models/loras");
        let meta_before = link.symlink_metadata().unwrap().modified().unwrap();

        apply_links(&lora_layout(), &package_root, &library_root)
            .await
            .unwrap();
        let meta_after = link.symlink_metadata().unwrap().modified().unwrap();

        assert!(is_symlink(&link));
        assert_eq!(meta_before, meta_after);
    }

    #[tokio::test]
    async fn test_existing_directory_is_merged_up() {
        let temp = TempDir::new().unwrap();
        let package_root = temp.path().join("pkg");
        let library_root = temp.path().join("lib");

        let dest = package_root.join("models/loras");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("style.safetensors"), b"weights").unwrap();

        apply_links(&lora_layout(), &package_root, &library_root)
            .await
            .unwrap();

        assert!(is_symlink(&package_root.join("models/loras")));
        // The user's file moved into the library, not deleted
        assert_eq!(
            std::fs::read(library_root.join("Lora/style.safetensors")).unwrap(),
            b"weights"
        );
    }

    #[tokio::test]
    async fn test_merge_keeps_both_on_content_conflict() {
        let temp = TempDir::new().unwrap();
        let package_root = temp.path().join("pkg");
        let library_root = temp.path().join("lib");

        std::fs::create_dir_all(library_root.join("Lora")).unwrap();
        std::fs::write(library_root.join("Lora/a.bin"), b"library copy").unwrap();

        let dest = package_root.join("models/loras");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("a.bin"), b"package copy").unwrap();

        apply_links(&lora_layout(), &package_root, &library_root)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(library_root.join("Lora/a.bin")).unwrap(),
            b"library copy"
        );
        assert_eq!(
            std::fs::read(library_root.join("Lora/a-1.bin")).unwrap(),
            b"package copy"
        );
    }

    #[tokio::test]
    async fn test_merge_drops_identical_duplicate() {
        let temp = TempDir::new().unwrap();
        let package_root = temp.path().join("pkg");
        let library_root = temp.path().join("lib");

        std::fs::create_dir_all(library_root.join("Lora")).unwrap();
        std::fs::write(library_root.join("Lora/a.bin"), b"same").unwrap();

        let dest = package_root.join("models/loras");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("a.bin"), b"same").unwrap();

        apply_links(&lora_layout(), &package_root, &library_root)
            .await
            .unwrap();

        assert!(library_root.join("Lora/a.bin").exists());
        assert!(!library_root.join("Lora/a-1.bin").exists());
    }

    #[tokio::test]
    async fn test_stale_link_is_replaced() {
        let temp = TempDir::new().unwrap();
        let package_root = temp.path().join("pkg");
        let library_root = temp.path().join("lib");

        let old_target = temp.path().join("old-target");
        std::fs::create_dir_all(&old_target).unwrap();
        let dest = package_root.join("models/loras");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        create_dir_link(&dest, &old_target).unwrap();

        apply_links(&lora_layout(), &package_root, &library_root)
            .await
            .unwrap();

        assert_eq!(link_target(&dest).unwrap(), library_root.join("Lora"));
    }

    #[tokio::test]
    async fn test_remove_deletes_links_but_not_real_dirs() {
        let temp = TempDir::new().unwrap();
        let package_root = temp.path().join("pkg");
        let library_root = temp.path().join("lib");
        std::fs::create_dir_all(&package_root).unwrap();

        let layout = lora_layout();
        apply_links(&layout, &package_root, &library_root)
            .await
            .unwrap();
        remove_links(&layout, &package_root).await.unwrap();

        let dest = package_root.join("models/loras");
        assert!(dest.symlink_metadata().is_err(), "link should be gone");

        // A real directory at the target survives remove
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("keep.bin"), b"x").unwrap();
        remove_links(&layout, &package_root).await.unwrap();
        assert!(dest.join("keep.bin").exists());
    }

    #[tokio::test]
    async fn test_category_less_rule_creates_plain_dir() {
        let temp = TempDir::new().unwrap();
        let package_root = temp.path().join("pkg");
        let library_root = temp.path().join("lib");

        let layout = SharedFolderLayout::new(vec![
            LayoutRule::default().with_targets(["models/inpaint-cache"])
        ]);

        apply_links(&layout, &package_root, &library_root)
            .await
            .unwrap();

        let dest = package_root.join("models/inpaint-cache");
        assert!(dest.is_dir());
        assert!(!is_symlink(&dest));
    }

    #[tokio::test]
    async fn test_orphaned_sibling_links_are_swept() {
        let temp = TempDir::new().unwrap();
        let package_root = temp.path().join("pkg");
        let library_root = temp.path().join("lib");

        // A broken link next to the rule target, left by an earlier run
        let models_dir = package_root.join("models");
        std::fs::create_dir_all(&models_dir).unwrap();
        let gone = temp.path().join("gone");
        std::fs::create_dir(&gone).unwrap();
        create_dir_link(&models_dir.join("old-loras"), &gone).unwrap();
        std::fs::remove_dir(&gone).unwrap();

        apply_links(&lora_layout(), &package_root, &library_root)
            .await
            .unwrap();

        assert!(models_dir.join("old-loras").symlink_metadata().is_err());
        assert!(is_symlink(&models_dir.join("loras")));
    }

    #[tokio::test]
    async fn test_chained_link_is_flattened() {
        let temp = TempDir::new().unwrap();
        let package_root = temp.path().join("pkg");
        let library_root = temp.path().join("lib");

        std::fs::create_dir_all(library_root.join("Lora")).unwrap();

        // dest -> middle -> library/Lora, left over from earlier breakage
        let middle = temp.path().join("middle");
        create_dir_link(&middle, &library_root.join("Lora")).unwrap();
        let dest = package_root.join("models/loras");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        create_dir_link(&dest, &middle).unwrap();

        apply_links(&lora_layout(), &package_root, &library_root)
            .await
            .unwrap();

        assert_eq!(link_target(&dest).unwrap(), library_root.join("Lora"));
    }
}
