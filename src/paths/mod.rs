//! Canonical Path Layout
//!
//! Every directory the engine touches, resolved once at startup into an
//! immutable value. Nothing else in the crate derives paths on its own;
//! the directory names below are a compatibility surface shared with the
//! game and with existing installations.

pub mod steam;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::GameConfig;

/// Reserved subtree inside the canonical install dir that holds all
/// archived versions and backups.
pub const VERSIONS_DIR: &str = "OldTrails";
/// Reserved subtree for user-managed mods, never swapped.
pub const MODS_DIR: &str = "mods";
/// Shared blueprint library inside the documents save dir.
pub const BLUEPRINTS_DIR: &str = "Blueprints";
/// Per-version save snapshot directory inside a version's archive.
pub const SAVE_DATA_DIR: &str = "_SaveData";
/// Install snapshot root inside the versions dir.
pub const STEAM_BACKUP_DIR: &str = "_SteamBackup";
/// Save snapshot root inside the documents versions dir.
pub const MAIN_BACKUP_DIR: &str = "_MainBackup";

/// LocalLow profile subpath, relative to the AppData root.
const LOCAL_LOW_SUBPATH: &str = "Flashbulb/Trailmakers";
/// Documents save directory name used by the game.
const DOCUMENTS_SAVE_DIR: &str = "TrailMakers";

/// All canonical and private paths, resolved once.
#[derive(Debug, Clone)]
pub struct GamePaths {
    /// Canonical Steam install directory the launcher reads from.
    pub install_dir: PathBuf,
    /// `<install_dir>/OldTrails`: version archive root.
    pub versions_root: PathBuf,
    /// `<versions_root>/_SteamBackup`: install snapshot holding area.
    pub steam_backup: PathBuf,
    /// Live LocalLow profile directory the game writes saves to.
    pub local_low: PathBuf,
    /// Live documents directory the game writes blueprints to.
    pub documents: PathBuf,
    /// `<documents parent>/OldTrails`: save snapshot root.
    pub saves_root: PathBuf,
    /// `<saves_root>/_MainBackup`: factory save snapshot.
    pub main_backup: PathBuf,
}

impl GamePaths {
    /// Resolve every path from the running user's environment. Fails when
    /// no Steam installation containing the game executable exists.
    pub fn resolve(game: &GameConfig) -> Result<Self> {
        let install_dir = steam::locate_canonical_install(&game.app_id, &game.exe_name)
            .ok_or(crate::error::EngineError::InstallNotFound)?;

        let base = directories::BaseDirs::new().context("could not determine home directories")?;
        // data_dir is AppData\Roaming on Windows; LocalLow is its sibling.
        let local_low = base
            .data_dir()
            .parent()
            .context("AppData directory has no parent")?
            .join("LocalLow")
            .join(LOCAL_LOW_SUBPATH);
        let documents = directories::UserDirs::new()
            .and_then(|u| u.document_dir().map(Path::to_path_buf))
            .context("could not determine the documents directory")?;

        Ok(Self::with_roots(
            install_dir,
            local_low,
            documents.join(DOCUMENTS_SAVE_DIR),
            documents.join(VERSIONS_DIR),
        ))
    }

    /// Build the layout from explicit roots. Used by `resolve` and by
    /// tests that stage a fake installation.
    pub fn with_roots(
        install_dir: PathBuf,
        local_low: PathBuf,
        documents: PathBuf,
        saves_root: PathBuf,
    ) -> Self {
        let versions_root = install_dir.join(VERSIONS_DIR);
        let steam_backup = versions_root.join(STEAM_BACKUP_DIR);
        let main_backup = saves_root.join(MAIN_BACKUP_DIR);
        Self {
            install_dir,
            versions_root,
            steam_backup,
            local_low,
            documents,
            saves_root,
            main_backup,
        }
    }

    /// Live shared blueprint library.
    pub fn live_blueprints(&self) -> PathBuf {
        self.documents.join(BLUEPRINTS_DIR)
    }

    /// Master blueprint superset inside the save snapshot.
    pub fn master_blueprints(&self) -> PathBuf {
        self.main_backup.join("Documents").join(BLUEPRINTS_DIR)
    }

    /// Create the directories the engine owns outright.
    pub fn ensure_roots(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.versions_root)?;
        std::fs::create_dir_all(&self.saves_root)?;
        Ok(())
    }
}
