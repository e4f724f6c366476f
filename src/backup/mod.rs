//! Backup Store
//!
//! One-time snapshot of the factory state: the untouched Steam install
//! directory and the untouched save directories. The snapshot is created
//! lazily, never overwritten once it exists, and copied back out whenever
//! a session ends or the application shuts down with swapped files.
//!
//! The modification flag is persisted as a marker file next to the
//! install snapshot so a crash during a session can be detected and
//! repaired on the next start.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::fsops;
use crate::paths::{GamePaths, MODS_DIR, VERSIONS_DIR};

/// Install snapshot directory name inside `_SteamBackup`.
const STEAM_GAME_DIR: &str = "SteamGame";
/// Marker file recording that the canonical install dir holds swapped
/// files. Present from install until a restore completes.
const DIRTY_MARKER: &str = ".install-dirty";

/// Owns the factory snapshots and the persisted modification flag.
pub struct BackupStore {
    paths: GamePaths,
    /// Wait before restore copies so the OS can release file handles.
    restore_settle: Duration,
}

impl BackupStore {
    pub fn new(paths: GamePaths, restore_settle: Duration) -> Self {
        Self {
            paths,
            restore_settle,
        }
    }

    fn install_snapshot(&self) -> PathBuf {
        self.paths.steam_backup.join(STEAM_GAME_DIR)
    }

    fn marker_path(&self) -> PathBuf {
        self.paths.steam_backup.join(DIRTY_MARKER)
    }

    /// Whether the canonical install dir is known to hold swapped files.
    pub fn is_modified(&self) -> bool {
        self.marker_path().exists()
    }

    /// Record that the canonical install dir no longer matches factory
    /// state. Survives a crash.
    pub fn mark_modified(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.paths.steam_backup)?;
        fs::write(self.marker_path(), b"")
    }

    /// Clear the modification flag after a completed restore.
    pub fn clear_modified(&self) -> std::io::Result<()> {
        match fs::remove_file(self.marker_path()) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Snapshot the factory install dir and save dirs if no snapshot
    /// exists yet. Idempotent: an existing snapshot is left untouched, so
    /// this is safe to call on every start as long as it runs before any
    /// install has altered the canonical directories.
    pub fn ensure_backup(&self) -> Result<(), EngineError> {
        self.ensure_install_backup()?;
        self.ensure_save_backup()?;
        Ok(())
    }

    fn ensure_install_backup(&self) -> Result<(), EngineError> {
        let snapshot = self.install_snapshot();
        if snapshot.exists() {
            return Ok(());
        }
        info!("backing up factory game directory");
        fs::create_dir_all(&snapshot)?;
        let report = fsops::copy_tree_except(&self.paths.install_dir, &snapshot, &[VERSIONS_DIR])?;
        if !report.is_clean() {
            warn!(
                "install backup skipped {} locked file(s)",
                report.skipped.len()
            );
        }
        info!("install backup complete ({} files)", report.processed);
        Ok(())
    }

    fn ensure_save_backup(&self) -> Result<(), EngineError> {
        if self.paths.main_backup.exists() {
            return Ok(());
        }
        info!("backing up factory save data");
        let local_low_snapshot = self.paths.main_backup.join("LocalLow");
        let documents_snapshot = self.paths.main_backup.join("Documents");
        fs::create_dir_all(&local_low_snapshot)?;
        fs::create_dir_all(&documents_snapshot)?;
        fsops::copy_tree(&self.paths.local_low, &local_low_snapshot)?;
        fsops::copy_tree_except(&self.paths.documents, &documents_snapshot, &[VERSIONS_DIR])?;
        Ok(())
    }

    /// Put the factory game files back into the canonical install dir.
    /// No-op when no snapshot exists. Reserved subtrees are preserved.
    pub fn restore_install(&self) -> Result<(), EngineError> {
        let snapshot = self.install_snapshot();
        if !snapshot.exists() {
            return Ok(());
        }
        info!("restoring factory game directory");
        std::thread::sleep(self.restore_settle);
        self.restore_dir(&snapshot, &self.paths.install_dir, &[VERSIONS_DIR, MODS_DIR])
    }

    /// Put the factory save data back into the live save directories.
    /// No-op when no snapshot exists.
    pub fn restore_saves(&self) -> Result<(), EngineError> {
        if !self.paths.main_backup.exists() {
            return Ok(());
        }
        info!("restoring factory save data");
        std::thread::sleep(self.restore_settle);
        self.restore_dir(&self.paths.main_backup.join("LocalLow"), &self.paths.local_low, &[])?;
        self.restore_dir(
            &self.paths.main_backup.join("Documents"),
            &self.paths.documents,
            &[VERSIONS_DIR],
        )
    }

    fn restore_dir(
        &self,
        snapshot: &Path,
        live: &Path,
        reserved: &[&str],
    ) -> Result<(), EngineError> {
        let wrap = |source| EngineError::Restore {
            path: live.to_path_buf(),
            source,
        };
        fsops::clear_tree(live, reserved).map_err(wrap)?;
        fsops::copy_tree(snapshot, live).map_err(wrap)?;
        Ok(())
    }

    /// Delete both snapshots. Only used by factory reset, after they have
    /// been copied back out.
    pub fn discard(&self) -> Result<(), EngineError> {
        for dir in [&self.paths.steam_backup, &self.paths.main_backup] {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }
}
