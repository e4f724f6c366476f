//! Session Lifecycle
//!
//! The state machine that drives a play session from install through
//! restore. Exactly one session can be active; every transition emits an
//! event, and every handled failure path funnels through a forced restore
//! so the canonical directories are never left holding a mix of files.

pub mod monitor;

use crossbeam_channel::Sender;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::archive::VersionArchive;
use crate::backup::BackupStore;
use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::launch::Launcher;
use crate::paths::GamePaths;
use crate::saves::SaveReconciler;
use crate::shared::EngineEvent;
use monitor::ProcessWatcher;

/// Where the engine is in the play cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; canonical directories hold factory state.
    Idle,
    /// Swapping the version payload into the install directory.
    Installing,
    /// Materializing the version's save state.
    SavePreparing,
    /// Waiting for the external launcher.
    Launching,
    /// The game is (believed to be) running.
    Running,
    /// Exit detected; waiting for file handles to settle.
    Closing,
    /// Persisting the session's saves into the version slot.
    SessionSaving,
    /// Copying factory state back into the canonical directories.
    Restoring,
}

impl SessionState {
    /// Short human-readable label for status lines.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Installing => "installing",
            SessionState::SavePreparing => "preparing save",
            SessionState::Launching => "launching",
            SessionState::Running => "running",
            SessionState::Closing => "closing",
            SessionState::SessionSaving => "saving session",
            SessionState::Restoring => "restoring",
        }
    }
}

/// Live session bookkeeping, present only between launch and teardown.
struct GameSession {
    version_name: String,
    watcher: Box<dyn ProcessWatcher>,
    started: Instant,
    /// Polls are suppressed until this instant so the game has time to
    /// appear in the process table.
    first_poll_at: Instant,
    /// Consecutive polls that failed to find the process.
    missed_polls: u32,
    /// Set when exit is confirmed; teardown waits for this instant.
    settle_until: Option<Instant>,
}

/// Timing knobs, converted from config once.
struct Timing {
    initial_poll_delay: Duration,
    exit_debounce_samples: u32,
    settle_delay: Duration,
}

/// The reconciliation engine and its lifecycle state machine.
pub struct SessionEngine {
    paths: GamePaths,
    backup: BackupStore,
    archive: VersionArchive,
    saves: SaveReconciler,
    launcher: Box<dyn Launcher>,
    exe_name: String,
    timing: Timing,
    events: Sender<EngineEvent>,
    state: SessionState,
    session: Option<GameSession>,
}

impl SessionEngine {
    /// Wire up the engine. Recovers from a crashed previous run (leftover
    /// modification marker) and takes the factory snapshot before any
    /// install can happen.
    pub fn new(
        paths: GamePaths,
        config: &SessionConfig,
        exe_name: String,
        launcher: Box<dyn Launcher>,
        events: Sender<EngineEvent>,
    ) -> Result<Self, EngineError> {
        paths.ensure_roots()?;

        let backup = BackupStore::new(
            paths.clone(),
            Duration::from_secs(config.restore_settle_secs),
        );
        let archive = VersionArchive::from(&paths);
        let saves = SaveReconciler::new(
            paths.clone(),
            VersionArchive::from(&paths),
            Duration::from_secs(config.settle_delay_secs),
        );

        let engine = Self {
            paths,
            backup,
            archive,
            saves,
            launcher,
            exe_name,
            timing: Timing {
                initial_poll_delay: Duration::from_secs(config.initial_poll_delay_secs),
                exit_debounce_samples: config.exit_debounce_samples,
                settle_delay: Duration::from_secs(config.settle_delay_secs),
            },
            events,
            state: SessionState::Idle,
            session: None,
        };

        // A leftover marker means a previous run crashed mid-session and
        // the canonical directories still hold a swapped version.
        if engine.backup.is_modified() {
            warn!("previous session did not restore cleanly, repairing");
            engine.status("Repairing files from an interrupted session...");
            engine.backup.restore_saves()?;
            engine.backup.restore_install()?;
            engine.backup.clear_modified()?;
        }

        engine.backup.ensure_backup()?;
        Ok(engine)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Display name of the version currently being played, if any.
    pub fn active_version(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.version_name.as_str())
    }

    /// Whether the canonical install dir holds swapped files.
    pub fn is_modified(&self) -> bool {
        self.backup.is_modified()
    }

    pub fn archive(&self) -> &VersionArchive {
        &self.archive
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            info!("session state: {} -> {}", self.state.label(), state.label());
            self.state = state;
            let _ = self.events.send(EngineEvent::StateChanged(state));
        }
    }

    fn status(&self, message: impl Into<String>) {
        let _ = self.events.send(EngineEvent::Status(message.into()));
    }

    /// Run the forward sequence: install the version, stage its saves,
    /// and launch. On any failure the canonical directories are restored
    /// before the error is returned.
    pub fn play(&mut self, version_name: &str) -> Result<(), EngineError> {
        if self.state != SessionState::Idle {
            return Err(EngineError::SessionActive);
        }

        if let Err(e) = self.run_forward(version_name) {
            error!("launch sequence failed: {e}");
            let _ = self.events.send(EngineEvent::Error(e.to_string()));
            self.status("Restoring files after launch error...");
            self.force_restore();
            self.set_state(SessionState::Idle);
            return Err(e);
        }
        Ok(())
    }

    fn run_forward(&mut self, version_name: &str) -> Result<(), EngineError> {
        self.set_state(SessionState::Installing);
        self.status(format!("Installing {version_name}..."));
        self.archive
            .install_version(&self.paths.install_dir, version_name)?;
        self.backup.mark_modified()?;

        self.set_state(SessionState::SavePreparing);
        self.status(format!("Preparing save for {version_name}..."));
        self.saves.prepare_session(version_name)?;

        self.set_state(SessionState::Launching);
        self.status("Launching through Steam...");
        let handle = self.launcher.launch(&self.paths)?;

        let now = Instant::now();
        self.session = Some(GameSession {
            version_name: version_name.to_string(),
            watcher: monitor::watcher_for(handle, &self.exe_name),
            started: now,
            first_poll_at: now + self.timing.initial_poll_delay,
            missed_polls: 0,
            settle_until: None,
        });
        self.set_state(SessionState::Running);
        self.status(format!("Playing {version_name}..."));
        let _ = self
            .events
            .send(EngineEvent::GameLaunched(version_name.to_string()));
        Ok(())
    }

    /// Advance the state machine one step. Call on a periodic timer while
    /// a session is active; a no-op in `Idle`.
    pub fn tick(&mut self) -> Result<(), EngineError> {
        match self.state {
            SessionState::Running => {
                self.poll_for_exit();
                Ok(())
            }
            SessionState::Closing => self.finish_if_settled(),
            _ => Ok(()),
        }
    }

    fn poll_for_exit(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let now = Instant::now();
        if now < session.first_poll_at {
            return;
        }

        if session.watcher.is_running() {
            session.missed_polls = 0;
            return;
        }
        session.missed_polls += 1;
        if session.missed_polls < self.timing.exit_debounce_samples {
            return;
        }

        let played_for = session.started.elapsed();
        info!(
            "game closed after {}s of play",
            played_for.as_secs()
        );
        session.settle_until = Some(now + self.timing.settle_delay);
        self.set_state(SessionState::Closing);
        self.status("Game closed, saving session...");
    }

    fn finish_if_settled(&mut self) -> Result<(), EngineError> {
        let settled = self
            .session
            .as_ref()
            .and_then(|s| s.settle_until)
            .is_some_and(|t| Instant::now() >= t);
        if !settled {
            return Ok(());
        }
        self.teardown()
    }

    /// The reverse sequence: persist the session's saves, then put
    /// factory state back. Restore failure keeps the modification flag
    /// set; everything else returns the engine to `Idle`.
    fn teardown(&mut self) -> Result<(), EngineError> {
        let version_name = match self.session.take() {
            Some(s) => s.version_name,
            None => return Ok(()),
        };

        self.set_state(SessionState::SessionSaving);
        if let Err(e) = self.saves.commit_session(&version_name) {
            // The restore must still run; losing one session's save is
            // better than leaving the canonical directories swapped.
            error!("failed to save session for '{version_name}': {e}");
            let _ = self.events.send(EngineEvent::Error(format!(
                "Could not save the session for {version_name}: {e}"
            )));
        }

        self.set_state(SessionState::Restoring);
        self.status("Restoring files...");
        let result = self.restore_all();
        self.set_state(SessionState::Idle);
        match result {
            Ok(()) => {
                self.status(format!("{version_name} session saved. Files restored."));
                let _ = self.events.send(EngineEvent::GameClosed(version_name));
                Ok(())
            }
            Err(e) => {
                let _ = self.events.send(EngineEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    fn restore_all(&mut self) -> Result<(), EngineError> {
        self.backup.restore_saves()?;
        self.backup.restore_install()?;
        self.backup.clear_modified()?;
        Ok(())
    }

    /// Best-effort restore on a failed forward sequence. Errors here are
    /// logged loudly but not propagated over the original failure; the
    /// modification flag stays set if the restore did not complete.
    fn force_restore(&mut self) {
        self.set_state(SessionState::Restoring);
        self.session = None;
        if let Err(e) = self.restore_all() {
            error!("cleanup restore failed, files may still be swapped: {e}");
            let _ = self.events.send(EngineEvent::Error(e.to_string()));
        }
    }

    /// Gate for application shutdown. Refuses while the game may still
    /// hold file handles; otherwise restores if anything was swapped.
    pub fn shutdown(&mut self) -> Result<(), EngineError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Running | SessionState::Closing => {
                return Err(EngineError::GameRunning)
            }
            // Mid-transition states only occur inside play()/tick().
            _ => return Err(EngineError::SessionActive),
        }
        if self.backup.is_modified() {
            self.status("Restoring files, please wait...");
            self.restore_all()?;
        }
        Ok(())
    }

    /// Remove a version's payload and saves. Refused while any session
    /// activity is in flight.
    pub fn uninstall(&mut self, version_name: &str) -> Result<(), EngineError> {
        if self.active_version() == Some(version_name) {
            return Err(EngineError::GameRunning);
        }
        if self.state != SessionState::Idle {
            return Err(EngineError::SessionActive);
        }
        self.archive.uninstall(version_name)
    }

    /// Restore everything from the snapshots and delete all archived
    /// versions, saves, and the snapshots themselves.
    pub fn factory_reset(&mut self) -> Result<(), EngineError> {
        if self.state != SessionState::Idle {
            return Err(EngineError::SessionActive);
        }
        self.status("Performing factory reset...");
        // Restore before the snapshots are deleted with everything else.
        self.restore_all()?;
        self.archive.wipe_all()?;
        self.backup.discard()?;
        self.status("Factory reset complete.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::LaunchHandle;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Launcher whose "game" is a shared flag the test can flip off.
    struct FlagLauncher {
        running: Arc<AtomicBool>,
        fail: bool,
    }

    struct FlagWatcher {
        running: Arc<AtomicBool>,
    }

    impl ProcessWatcher for FlagWatcher {
        fn is_running(&mut self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    impl Launcher for FlagLauncher {
        fn launch(&self, _paths: &GamePaths) -> Result<LaunchHandle, EngineError> {
            if self.fail {
                return Err(EngineError::Launch("refused by test".to_string()));
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(LaunchHandle::Detached)
        }
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    struct Fixture {
        _tmp: TempDir,
        paths: GamePaths,
        engine: SessionEngine,
        running: Arc<AtomicBool>,
        events: crossbeam_channel::Receiver<EngineEvent>,
    }

    fn fixture_with(fail_launch: bool) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let paths = GamePaths::with_roots(
            tmp.path().join("game"),
            tmp.path().join("locallow"),
            tmp.path().join("docs/TrailMakers"),
            tmp.path().join("docs/OldTrails"),
        );

        // Factory state.
        write(&paths.install_dir.join("Trailmakers.exe"), "factory-exe");
        write(&paths.local_low.join("settings.dat"), "factory-settings");
        write(
            &paths.documents.join("Blueprints/car.blueprint"),
            "factory-car",
        );

        // Archived payload for 1.0.
        let archive = VersionArchive::new(paths.versions_root.clone());
        write(
            &archive.payload_dir("1.0 Release").join("Trailmakers.exe"),
            "v1-exe",
        );

        let running = Arc::new(AtomicBool::new(false));
        let launcher = FlagLauncher {
            running: running.clone(),
            fail: fail_launch,
        };
        let (tx, rx) = crossbeam_channel::unbounded();

        // Zero delays so ticks act immediately.
        let config = SessionConfig {
            poll_interval_secs: 0,
            initial_poll_delay_secs: 0,
            exit_debounce_samples: 3,
            settle_delay_secs: 0,
            restore_settle_secs: 0,
        };

        let engine = SessionEngine::new(
            paths.clone(),
            &config,
            "Trailmakers.exe".to_string(),
            Box::new(launcher),
            tx,
        )
        .unwrap();

        Fixture {
            _tmp: tmp,
            paths,
            engine,
            running,
            events: rx,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(false)
    }

    /// Replace the engine's watcher with one driven by the test flag.
    fn attach_flag_watcher(f: &mut Fixture) {
        if let Some(session) = f.engine.session.as_mut() {
            session.watcher = Box::new(FlagWatcher {
                running: f.running.clone(),
            });
        }
    }

    #[test]
    fn test_full_session_cycle() {
        let mut f = fixture();

        f.engine.play("1.0 Release").unwrap();
        attach_flag_watcher(&mut f);
        assert_eq!(f.engine.state(), SessionState::Running);
        assert_eq!(f.engine.active_version(), Some("1.0 Release"));
        assert!(f.engine.is_modified());
        assert_eq!(
            read(&f.paths.install_dir.join("Trailmakers.exe")),
            "v1-exe"
        );

        // Simulate play: the game writes a save and a new blueprint.
        write(&f.paths.local_low.join("progress.dat"), "played");
        write(
            &f.paths.documents.join("Blueprints/rover.blueprint"),
            "session-rover",
        );

        // One missed poll is not an exit.
        f.running.store(false, Ordering::SeqCst);
        f.engine.tick().unwrap();
        assert_eq!(f.engine.state(), SessionState::Running);
        f.running.store(true, Ordering::SeqCst);
        f.engine.tick().unwrap();

        // Three consecutive misses confirm the exit.
        f.running.store(false, Ordering::SeqCst);
        f.engine.tick().unwrap();
        f.engine.tick().unwrap();
        f.engine.tick().unwrap();
        assert_eq!(f.engine.state(), SessionState::Closing);

        // Next tick tears down (settle delay is zero).
        f.engine.tick().unwrap();
        assert_eq!(f.engine.state(), SessionState::Idle);
        assert!(!f.engine.is_modified());
        assert!(f.engine.active_version().is_none());

        // Factory files are back.
        assert_eq!(
            read(&f.paths.install_dir.join("Trailmakers.exe")),
            "factory-exe"
        );
        assert_eq!(
            read(&f.paths.local_low.join("settings.dat")),
            "factory-settings"
        );

        // The session's save and blueprint were archived, and the new
        // blueprint reached the master set.
        let slot = f.engine.archive().save_slot_dir("1.0 Release");
        assert_eq!(read(&slot.join("LocalLow/progress.dat")), "played");
        assert_eq!(
            read(&slot.join("Documents/Blueprints/rover.blueprint")),
            "session-rover"
        );
        assert_eq!(
            read(&f.paths.master_blueprints().join("rover.blueprint")),
            "session-rover"
        );
    }

    #[test]
    fn test_second_play_rejected_without_side_effects() {
        let mut f = fixture();
        f.engine.play("1.0 Release").unwrap();
        attach_flag_watcher(&mut f);

        let before = read(&f.paths.install_dir.join("Trailmakers.exe"));
        let err = f.engine.play("1.0 Release").unwrap_err();
        assert!(matches!(err, EngineError::SessionActive));
        assert_eq!(
            read(&f.paths.install_dir.join("Trailmakers.exe")),
            before
        );
        assert_eq!(f.engine.state(), SessionState::Running);
    }

    #[test]
    fn test_missing_payload_fails_and_restores() {
        let mut f = fixture();

        let err = f.engine.play("0.8.0 Rally").unwrap_err();
        assert!(matches!(err, EngineError::MissingPayload(_)));
        assert_eq!(f.engine.state(), SessionState::Idle);
        assert!(!f.engine.is_modified());
        assert_eq!(
            read(&f.paths.install_dir.join("Trailmakers.exe")),
            "factory-exe"
        );
    }

    #[test]
    fn test_launch_failure_restores_factory_state() {
        let mut f = fixture_with(true);

        let err = f.engine.play("1.0 Release").unwrap_err();
        assert!(matches!(err, EngineError::Launch(_)));
        assert_eq!(f.engine.state(), SessionState::Idle);
        // The install happened, then the failure path undid it.
        assert_eq!(
            read(&f.paths.install_dir.join("Trailmakers.exe")),
            "factory-exe"
        );
        assert!(!f.engine.is_modified());
    }

    #[test]
    fn test_shutdown_refused_while_running() {
        let mut f = fixture();
        f.engine.play("1.0 Release").unwrap();
        attach_flag_watcher(&mut f);

        let err = f.engine.shutdown().unwrap_err();
        assert!(matches!(err, EngineError::GameRunning));
        // Still swapped; nothing was touched.
        assert_eq!(read(&f.paths.install_dir.join("Trailmakers.exe")), "v1-exe");
    }

    #[test]
    fn test_shutdown_restores_when_modified() {
        let mut f = fixture();
        // Simulate a session that installed but whose teardown never ran
        // by marking the dirty state directly.
        f.engine
            .archive()
            .install_version(&f.paths.install_dir, "1.0 Release")
            .unwrap();
        f.engine.backup.mark_modified().unwrap();

        f.engine.shutdown().unwrap();
        assert!(!f.engine.is_modified());
        assert_eq!(
            read(&f.paths.install_dir.join("Trailmakers.exe")),
            "factory-exe"
        );
    }

    #[test]
    fn test_crash_recovery_on_startup() {
        let f = fixture();
        let paths = f.paths.clone();
        let running = f.running.clone();
        drop(f.engine);

        // Swap files and leave the marker behind, as a crash would.
        let archive = VersionArchive::new(paths.versions_root.clone());
        archive
            .install_version(&paths.install_dir, "1.0 Release")
            .unwrap();
        let backup = BackupStore::new(paths.clone(), Duration::ZERO);
        backup.mark_modified().unwrap();

        let (tx, _rx) = crossbeam_channel::unbounded();
        let config = SessionConfig {
            restore_settle_secs: 0,
            ..SessionConfig::default()
        };
        let engine = SessionEngine::new(
            paths.clone(),
            &config,
            "Trailmakers.exe".to_string(),
            Box::new(FlagLauncher {
                running,
                fail: false,
            }),
            tx,
        )
        .unwrap();

        assert!(!engine.is_modified());
        assert_eq!(
            read(&paths.install_dir.join("Trailmakers.exe")),
            "factory-exe"
        );
    }

    #[test]
    fn test_uninstall_refused_for_active_session() {
        let mut f = fixture();
        f.engine.play("1.0 Release").unwrap();
        attach_flag_watcher(&mut f);

        let err = f.engine.uninstall("1.0 Release").unwrap_err();
        assert!(matches!(err, EngineError::GameRunning));

        // Other versions are just as untouchable while a session runs.
        let err = f.engine.uninstall("0.8.0 Rally").unwrap_err();
        assert!(matches!(err, EngineError::SessionActive));
    }

    #[test]
    fn test_factory_reset_restores_then_wipes() {
        let mut f = fixture();

        // Play and finish a session so archives and a save slot exist.
        f.engine.play("1.0 Release").unwrap();
        attach_flag_watcher(&mut f);
        f.running.store(false, Ordering::SeqCst);
        for _ in 0..4 {
            f.engine.tick().unwrap();
        }
        assert_eq!(f.engine.state(), SessionState::Idle);

        f.engine.factory_reset().unwrap();

        assert_eq!(
            read(&f.paths.install_dir.join("Trailmakers.exe")),
            "factory-exe"
        );
        // Everything under the versions root is gone.
        let leftover: Vec<_> = fs::read_dir(&f.paths.versions_root)
            .unwrap()
            .collect();
        assert!(leftover.is_empty());
        assert!(!f.paths.main_backup.exists());
    }

    #[test]
    fn test_events_follow_the_cycle() {
        let mut f = fixture();
        f.engine.play("1.0 Release").unwrap();
        attach_flag_watcher(&mut f);

        let mut states = Vec::new();
        while let Ok(event) = f.events.try_recv() {
            if let EngineEvent::StateChanged(s) = event {
                states.push(s);
            }
        }
        assert_eq!(
            states,
            vec![
                SessionState::Installing,
                SessionState::SavePreparing,
                SessionState::Launching,
                SessionState::Running,
            ]
        );
    }
}
