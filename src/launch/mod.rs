//! Launch Provider
//!
//! Starts the game either through Steam (`steam.exe -applaunch`) or by
//! spawning the installed executable directly. A Steam launch hands the
//! process to Steam, so the returned handle is inert and exit detection
//! falls back to polling the process table.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::info;

use crate::error::EngineError;
use crate::paths::{steam, GamePaths};

/// What the launcher gives back: either a child we own and can wait on,
/// or nothing observable beyond the process table.
#[derive(Debug)]
pub enum LaunchHandle {
    /// We spawned the game ourselves and own the process.
    Direct(Child),
    /// Something else (Steam) owns the game process.
    Detached,
}

/// Starts the external game process.
pub trait Launcher: Send {
    fn launch(&self, paths: &GamePaths) -> Result<LaunchHandle, EngineError>;
}

/// Launches through the Steam client so the game gets its expected
/// environment (overlay, achievements, workshop paths).
pub struct SteamLauncher {
    app_id: String,
}

impl SteamLauncher {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
        }
    }
}

impl Launcher for SteamLauncher {
    fn launch(&self, _paths: &GamePaths) -> Result<LaunchHandle, EngineError> {
        let steam_exe = steam::locate_steam_executable()
            .ok_or_else(|| EngineError::Launch("Steam executable not found".to_string()))?;

        info!("launching app {} through {}", self.app_id, steam_exe.display());
        Command::new(&steam_exe)
            .arg("-applaunch")
            .arg(&self.app_id)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::Launch(format!("could not start Steam: {e}")))?;

        // Steam re-parents the game; the child we spawned is only the
        // client trampoline, so exit detection must poll by name.
        Ok(LaunchHandle::Detached)
    }
}

/// Spawns the game executable straight from the canonical install dir,
/// bypassing Steam. The child handle supports synchronous exit checks.
pub struct DirectLauncher {
    exe_name: String,
}

impl DirectLauncher {
    pub fn new(exe_name: impl Into<String>) -> Self {
        Self {
            exe_name: exe_name.into(),
        }
    }

    /// Full path to the executable inside the canonical install dir.
    pub fn exe_path(&self, paths: &GamePaths) -> PathBuf {
        paths.install_dir.join(&self.exe_name)
    }
}

impl Launcher for DirectLauncher {
    fn launch(&self, paths: &GamePaths) -> Result<LaunchHandle, EngineError> {
        let exe = self.exe_path(paths);
        if !exe.exists() {
            return Err(EngineError::Launch(format!(
                "{} not found in the install directory",
                self.exe_name
            )));
        }

        info!("launching {} directly", exe.display());
        let child = Command::new(&exe)
            .current_dir(&paths.install_dir)
            .spawn()
            .map_err(|e| EngineError::Launch(format!("could not start the game: {e}")))?;
        Ok(LaunchHandle::Direct(child))
    }
}
