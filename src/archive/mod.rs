//! Version Archive
//!
//! Per-version on-disk storage under the versions root: an immutable
//! payload (the downloaded game files) and a mutable `_SaveData` slot
//! holding that version's save snapshot. Also the installer that swaps a
//! payload into the canonical Steam directory.

pub mod catalog;

pub use catalog::{VersionCatalog, VersionInfo};

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::EngineError;
use crate::fsops;
use crate::paths::{GamePaths, MODS_DIR, SAVE_DATA_DIR, VERSIONS_DIR};

/// Archive folder name for a version: the display name with characters
/// that are unsafe in directory names removed. Existing installations
/// depend on this exact mapping.
pub fn safe_folder_name(version_name: &str) -> String {
    let cleaned: String = version_name
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | ':'))
        .collect();
    format!("Trailmakers {cleaned}")
}

/// Storage for every archived version.
#[derive(Debug, Clone)]
pub struct VersionArchive {
    versions_root: PathBuf,
}

impl VersionArchive {
    pub fn new(versions_root: PathBuf) -> Self {
        Self { versions_root }
    }

    /// The archived payload directory for a version.
    pub fn payload_dir(&self, version_name: &str) -> PathBuf {
        self.versions_root.join(safe_folder_name(version_name))
    }

    /// The version's save snapshot directory.
    pub fn save_slot_dir(&self, version_name: &str) -> PathBuf {
        self.payload_dir(version_name).join(SAVE_DATA_DIR)
    }

    /// Whether the version's payload has been downloaded.
    pub fn is_installed(&self, version_name: &str) -> bool {
        self.payload_dir(version_name).is_dir()
    }

    /// Manifest ids of every catalog entry whose payload exists on disk.
    pub fn installed_manifest_ids(&self, catalog: &VersionCatalog) -> Vec<String> {
        catalog
            .versions()
            .iter()
            .filter(|v| self.is_installed(&v.name))
            .map(|v| v.manifest_id.clone())
            .collect()
    }

    /// Swap the version's payload into the canonical install directory.
    /// Everything previously there is removed except the reserved
    /// subtrees, so this must never run without a prior backup snapshot.
    pub fn install_version(
        &self,
        install_dir: &Path,
        version_name: &str,
    ) -> Result<(), EngineError> {
        let payload = self.payload_dir(version_name);
        if !payload.is_dir() {
            return Err(EngineError::MissingPayload(version_name.to_string()));
        }

        info!("installing '{version_name}' into {}", install_dir.display());
        fsops::clear_tree(install_dir, &[VERSIONS_DIR, MODS_DIR])?;
        fsops::copy_tree(&payload, install_dir)?;
        Ok(())
    }

    /// Delete a version's payload and save slot.
    pub fn uninstall(&self, version_name: &str) -> Result<(), EngineError> {
        let payload = self.payload_dir(version_name);
        if !payload.exists() {
            return Err(EngineError::MissingPayload(version_name.to_string()));
        }
        fs::remove_dir_all(&payload)?;
        info!("uninstalled '{version_name}'");
        Ok(())
    }

    /// Delete every directory under the versions root: payloads, save
    /// slots, backups, and stale temp downloads. Used by factory reset,
    /// after the canonical directories have been restored.
    pub fn wipe_all(&self) -> Result<(), EngineError> {
        if !self.versions_root.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.versions_root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }
}

impl From<&GamePaths> for VersionArchive {
    fn from(paths: &GamePaths) -> Self {
        Self::new(paths.versions_root.clone())
    }
}
