//! Application Coordinator
//!
//! Wires the session engine to the terminal: spawns the monitor loop that
//! ticks the state machine, relays engine events to the user, and runs
//! the interactive download delegate.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::archive::VersionCatalog;
use crate::config::AppConfig;
use crate::download::{Credentials, DepotClient, DownloadDelegate, FetchProgress, GuardPrompt};
use crate::error::EngineError;
use crate::launch::{DirectLauncher, Launcher, SteamLauncher};
use crate::paths::GamePaths;
use crate::session::{SessionEngine, SessionState};
use crate::shared::EngineEvent;

/// Top-level application object owning the engine and its event stream.
pub struct VaultApp {
    config: AppConfig,
    paths: GamePaths,
    catalog: VersionCatalog,
    engine: Arc<Mutex<SessionEngine>>,
    events: Receiver<EngineEvent>,
}

impl VaultApp {
    /// Resolve paths, recover any interrupted session, and snapshot the
    /// factory state. `direct` launches the game executable itself
    /// instead of going through Steam.
    pub fn new(config: AppConfig, catalog: VersionCatalog, direct: bool) -> Result<Self> {
        let paths = GamePaths::resolve(&config.game)?;
        info!("managing install at {}", paths.install_dir.display());

        let launcher: Box<dyn Launcher> = if direct {
            Box::new(DirectLauncher::new(config.game.exe_name.clone()))
        } else {
            Box::new(SteamLauncher::new(config.game.app_id.clone()))
        };

        let (event_tx, events) = unbounded();
        let engine = SessionEngine::new(
            paths.clone(),
            &config.session,
            config.game.exe_name.clone(),
            launcher,
            event_tx,
        )?;

        Ok(Self {
            config,
            paths,
            catalog,
            engine: Arc::new(Mutex::new(engine)),
            events,
        })
    }

    /// Print the catalog, marking versions with a downloaded payload.
    pub fn list(&self) {
        let downloaded = self
            .engine
            .lock()
            .archive()
            .installed_manifest_ids(&self.catalog);
        for version in self.catalog.versions() {
            let marker = if downloaded.contains(&version.manifest_id) {
                "[downloaded]"
            } else {
                "            "
            };
            println!("{marker} {}", version.name);
        }
    }

    /// Run a full play cycle: install, launch, watch for exit, restore.
    /// Blocks until the canonical directories are factory-clean again.
    pub fn play(&mut self, version_name: &str) -> Result<()> {
        let version = self
            .catalog
            .find(version_name)
            .ok_or_else(|| EngineError::UnknownVersion(version_name.to_string()))?
            .clone();

        let launched = self.engine.lock().play(&version.name);
        while let Ok(event) = self.events.try_recv() {
            render_event(&event);
        }
        launched?;

        // Tick the state machine on its own thread so event rendering
        // stays responsive.
        let engine = Arc::clone(&self.engine);
        let interval = Duration::from_secs(self.config.session.poll_interval_secs.max(1));
        let monitor = std::thread::spawn(move || -> Result<(), EngineError> {
            loop {
                std::thread::sleep(interval);
                let mut engine = engine.lock();
                engine.tick()?;
                if engine.state() == SessionState::Idle {
                    return Ok(());
                }
            }
        });

        while !monitor.is_finished() {
            match self.events.recv_timeout(Duration::from_millis(250)) {
                Ok(event) => render_event(&event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        // Drain whatever the teardown emitted after the last recv.
        while let Ok(event) = self.events.try_recv() {
            render_event(&event);
        }

        monitor
            .join()
            .map_err(|_| anyhow!("session monitor thread panicked"))??;
        Ok(())
    }

    /// Download a version into the archive, answering Steam Guard
    /// prompts interactively.
    pub fn fetch(&self, version_name: &str, creds: &Credentials) -> Result<()> {
        let version = self
            .catalog
            .find(version_name)
            .ok_or_else(|| EngineError::UnknownVersion(version_name.to_string()))?
            .clone();

        let client = DepotClient::new(&self.config.game, &self.config.download);
        let mut delegate = TerminalDelegate::default();
        let payload =
            client.fetch_version(&version, &self.paths.versions_root, creds, &mut delegate)?;
        println!("Installed '{}' at {}", version.name, payload.display());
        Ok(())
    }

    /// Delete a downloaded version and its save snapshot.
    pub fn uninstall(&self, version_name: &str) -> Result<()> {
        self.engine.lock().uninstall(version_name)?;
        println!("{version_name} uninstalled.");
        Ok(())
    }

    /// Restore factory state and delete everything this tool created.
    pub fn factory_reset(&self) -> Result<()> {
        self.engine.lock().factory_reset()?;
        while let Ok(event) = self.events.try_recv() {
            render_event(&event);
        }
        Ok(())
    }

    /// Force a restore of the canonical directories if they are marked
    /// as modified. Safe to run any time the game is not running.
    pub fn restore(&self) -> Result<()> {
        let mut engine = self.engine.lock();
        if !engine.is_modified() {
            println!("Files already match factory state.");
            return Ok(());
        }
        engine.shutdown()?;
        println!("Factory files restored.");
        Ok(())
    }

    /// Shutdown guard: refuses while the game runs, restores if needed.
    pub fn shutdown(&self) -> Result<()> {
        self.engine.lock().shutdown().context("shutdown blocked")
    }
}

fn render_event(event: &EngineEvent) {
    match event {
        EngineEvent::Status(message) => println!("{message}"),
        EngineEvent::GameLaunched(version) => println!("{version} is running."),
        EngineEvent::GameClosed(version) => println!("{version} session saved."),
        EngineEvent::Error(message) => eprintln!("error: {message}"),
        EngineEvent::StateChanged(_) => {}
    }
}

/// Download delegate that renders progress to the terminal and reads
/// Steam Guard codes from stdin.
#[derive(Default)]
struct TerminalDelegate {
    showed_percent: bool,
}

impl DownloadDelegate for TerminalDelegate {
    fn on_progress(&mut self, progress: FetchProgress) {
        match progress {
            FetchProgress::Phase(message) => {
                if self.showed_percent {
                    println!();
                    self.showed_percent = false;
                }
                println!("{message}");
            }
            FetchProgress::Percent(pct) => {
                print!("\rDownloading: {pct:.2}%");
                let _ = std::io::stdout().flush();
                self.showed_percent = true;
            }
        }
    }

    fn on_guard(&mut self, prompt: GuardPrompt) -> Option<String> {
        match prompt {
            GuardPrompt::MobileConfirm => {
                println!("Confirm this sign-in in the Steam Mobile App.");
                None
            }
            GuardPrompt::EmailCode => read_code("Enter the code sent to your email: "),
            GuardPrompt::TwoFactorCode => read_code("Enter your Steam Guard code: "),
        }
    }
}

fn read_code(prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok()?;
    let code = line.trim().to_string();
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}
