//! Installed-package records and their persisted registry.
//!
//! The registry is a JSON document under the library root, written
//! atomically. It also hands out per-package async locks so concurrent
//! pipelines for the same install (a version switch racing an uninstall)
//! serialize instead of corrupting state.

use crate::descriptors::PackageDescriptor;
use chrono::{DateTime, Utc};
use hangar_core::config::PathsConfig;
use hangar_core::metadata::{atomic_read_json, atomic_write_json};
use hangar_core::shared_folders::{SharedFolderEngine, SharedFolderStrategy};
use hangar_core::system::Accelerator;
use hangar_core::{HangarError, Result, VersionSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// A persisted record of one installed package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub id: Uuid,
    /// Descriptor id this install was created from.
    pub package_id: String,
    pub display_name: String,
    /// Directory name under `<library>/Packages/`.
    pub directory_name: String,
    pub version: VersionSpec,
    #[serde(default)]
    pub accelerator: Option<Accelerator>,
    pub shared_folder_strategy: SharedFolderStrategy,
    /// User launch-argument overrides, passed after the defaults.
    #[serde(default)]
    pub launch_args: Vec<String>,
    #[serde(default)]
    pub use_shared_outputs: bool,
    #[serde(default)]
    pub last_update_check: Option<DateTime<Utc>>,
}

impl InstalledPackage {
    /// Absolute install directory under the library root.
    pub fn full_path(&self, library_root: &Path) -> PathBuf {
        library_root
            .join(PathsConfig::PACKAGES_DIR_NAME)
            .join(&self.directory_name)
    }
}

/// Persisted registry of installed packages.
pub struct InstalledPackageRegistry {
    library_root: PathBuf,
    registry_path: PathBuf,
    packages: RwLock<Vec<InstalledPackage>>,
    /// Per-package pipeline locks, created on demand.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl InstalledPackageRegistry {
    /// Open (or initialize) the registry under a library root.
    pub fn open(library_root: impl Into<PathBuf>) -> Result<Self> {
        let library_root = library_root.into();
        let registry_path = library_root.join(PathsConfig::REGISTRY_FILE_NAME);

        let packages: Vec<InstalledPackage> =
            atomic_read_json(&registry_path)?.unwrap_or_default();

        Ok(Self {
            library_root,
            registry_path,
            packages: RwLock::new(packages),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    /// The shared models root (`<library>/Models`).
    pub fn models_root(&self) -> PathBuf {
        self.library_root.join(PathsConfig::MODELS_DIR_NAME)
    }

    /// The shared outputs root (`<library>/Outputs`).
    pub fn outputs_root(&self) -> PathBuf {
        self.library_root.join(PathsConfig::OUTPUTS_DIR_NAME)
    }

    /// Exclusive lock for one package's pipelines.
    ///
    /// Hold this across any install/update/uninstall touching the package
    /// so concurrent operations on the same install serialize.
    pub async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_default().clone()
    }

    pub async fn list(&self) -> Vec<InstalledPackage> {
        self.packages.read().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<InstalledPackage> {
        self.packages.read().await.iter().find(|p| p.id == id).cloned()
    }

    /// Register a new install.
    pub async fn add(&self, package: InstalledPackage) -> Result<()> {
        let mut packages = self.packages.write().await;
        packages.push(package);
        self.save(&packages)
    }

    /// Replace an existing record (version change, new launch args).
    pub async fn update(&self, package: InstalledPackage) -> Result<()> {
        let mut packages = self.packages.write().await;
        match packages.iter_mut().find(|p| p.id == package.id) {
            Some(existing) => {
                *existing = package;
                self.save(&packages)
            }
            None => Err(HangarError::PackageNotFound {
                id: package.id.to_string(),
            }),
        }
    }

    /// Record the version after a successful update pipeline.
    pub async fn set_version(&self, id: Uuid, version: VersionSpec) -> Result<()> {
        let mut packages = self.packages.write().await;
        match packages.iter_mut().find(|p| p.id == id) {
            Some(existing) => {
                existing.version = version;
                self.save(&packages)
            }
            None => Err(HangarError::PackageNotFound { id: id.to_string() }),
        }
    }

    /// Stamp the last update-check time.
    pub async fn touch_update_check(&self, id: Uuid) -> Result<()> {
        let mut packages = self.packages.write().await;
        if let Some(existing) = packages.iter_mut().find(|p| p.id == id) {
            existing.last_update_check = Some(Utc::now());
            return self.save(&packages);
        }
        Ok(())
    }

    /// Uninstall: unlink shared folders, delete the install directory with
    /// bounded retries, drop the record.
    ///
    /// Callers must hold the package's pipeline lock.
    pub async fn uninstall(&self, id: Uuid, descriptor: &PackageDescriptor) -> Result<()> {
        let package = self
            .get(id)
            .await
            .ok_or_else(|| HangarError::PackageNotFound { id: id.to_string() })?;

        let install_dir = package.full_path(&self.library_root);

        // Unlink first so deleting the tree can never follow a link into
        // the shared library.
        if let Err(e) = SharedFolderEngine::remove(
            &descriptor.shared_folders,
            &install_dir,
            package.shared_folder_strategy,
        )
        .await
        {
            warn!("Failed to remove shared folder links for {}: {}", package.display_name, e);
        }
        if package.use_shared_outputs {
            if let Err(e) = SharedFolderEngine::remove_output_links(
                &descriptor.shared_output_paths,
                &install_dir,
            )
            .await
            {
                warn!("Failed to remove output links for {}: {}", package.display_name, e);
            }
        }

        hangar_core::platform::remove_dir_all_with_retry(&install_dir).await?;

        let mut packages = self.packages.write().await;
        packages.retain(|p| p.id != id);
        self.save(&packages)?;

        info!("Uninstalled {} ({})", package.display_name, id);
        Ok(())
    }

    fn save(&self, packages: &[InstalledPackage]) -> Result<()> {
        atomic_write_json(&self.registry_path, &packages.to_vec(), true)
    }
}
