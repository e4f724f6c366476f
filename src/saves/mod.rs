//! Save and Blueprint Reconciliation
//!
//! Moves a version's save snapshot in and out of the live save
//! directories around a play session, while keeping the blueprint library
//! shared across every version. Blueprints are union-merged: a file is
//! copied only where it does not already exist, so nothing a newer
//! version saved is ever overwritten by an older snapshot.
//!
//! Ordering on commit matters: new live blueprints are folded into the
//! master set first, and the master set is then copied into the version's
//! own snapshot, so creations from this session reach every other
//! version's next launch.

use std::fs;
use std::time::Duration;
use tracing::info;

use crate::archive::VersionArchive;
use crate::error::EngineError;
use crate::fsops;
use crate::paths::{GamePaths, BLUEPRINTS_DIR, VERSIONS_DIR};

/// Reconciles the live save directories with a version's save slot and
/// the master blueprint set.
pub struct SaveReconciler {
    paths: GamePaths,
    archive: VersionArchive,
    /// Wait after exit detection before reading the live save dirs.
    settle_delay: Duration,
}

impl SaveReconciler {
    pub fn new(paths: GamePaths, archive: VersionArchive, settle_delay: Duration) -> Self {
        Self {
            paths,
            archive,
            settle_delay,
        }
    }

    /// Materialize the version's save state into the live directories,
    /// seeded with the master blueprint set. A version without a save
    /// slot is a first run and only gets the merged blueprints.
    pub fn prepare_session(&self, version_name: &str) -> Result<(), EngineError> {
        let live_blueprints = self.paths.live_blueprints();

        fsops::clear_tree(&self.paths.local_low, &[])?;
        fsops::clear_tree(&self.paths.documents, &[VERSIONS_DIR, BLUEPRINTS_DIR])?;
        fsops::merge_tree(&self.paths.master_blueprints(), &live_blueprints)?;

        let slot = self.archive.save_slot_dir(version_name);
        if !slot.exists() {
            info!("no saved session for '{version_name}', starting fresh");
            return Ok(());
        }

        info!("restoring saved session for '{version_name}'");
        fsops::copy_tree(&slot.join("LocalLow"), &self.paths.local_low)?;
        fsops::copy_tree_except(
            &slot.join("Documents"),
            &self.paths.documents,
            &[BLUEPRINTS_DIR],
        )?;
        // The version's own blueprint snapshot fills gaps only; the
        // master set merged above wins on conflicts.
        fsops::merge_tree(&slot.join("Documents").join(BLUEPRINTS_DIR), &live_blueprints)?;
        Ok(())
    }

    /// Persist the live save state back into the version's slot and fold
    /// new blueprints into the master set.
    pub fn commit_session(&self, version_name: &str) -> Result<(), EngineError> {
        info!("saving session data for '{version_name}'");
        std::thread::sleep(self.settle_delay);

        let slot = self.archive.save_slot_dir(version_name);
        if slot.exists() {
            fs::remove_dir_all(&slot)?;
        }
        let slot_local_low = slot.join("LocalLow");
        let slot_documents = slot.join("Documents");
        fs::create_dir_all(&slot_local_low)?;
        fs::create_dir_all(&slot_documents)?;

        fsops::copy_tree(&self.paths.local_low, &slot_local_low)?;
        fsops::copy_tree_except(
            &self.paths.documents,
            &slot_documents,
            &[BLUEPRINTS_DIR, VERSIONS_DIR],
        )?;

        // Master first, then slot: the slot must carry the already-merged
        // superset so the session's creations propagate everywhere.
        let master_blueprints = self.paths.master_blueprints();
        fsops::merge_tree(&self.paths.live_blueprints(), &master_blueprints)?;
        fsops::copy_tree(&master_blueprints, &slot_documents.join(BLUEPRINTS_DIR))?;
        Ok(())
    }
}
