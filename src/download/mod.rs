//! Download Provider
//!
//! Drives the external DepotDownloader tool to fetch one historical build
//! from Steam into the version archive. The tool's protocol is opaque;
//! this module only stages a temp directory, relays its console output as
//! progress, answers Steam Guard prompts over stdin, and validates that a
//! complete payload (the game executable) actually arrived.

use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use regex::Regex;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

use crate::archive::{safe_folder_name, VersionInfo};
use crate::config::{DownloadConfig, GameConfig};
use crate::error::EngineError;

/// Steam login used by the download tool. Never persisted.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A Steam Guard challenge the tool is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPrompt {
    /// A code was sent to the account's email address.
    EmailCode,
    /// An authenticator app code is required.
    TwoFactorCode,
    /// Confirmation in the Steam mobile app; nothing to type.
    MobileConfirm,
}

/// Progress reported while a fetch runs.
#[derive(Debug, Clone)]
pub enum FetchProgress {
    /// A coarse phase description ("Logging in to Steam...").
    Phase(String),
    /// Download completion percentage.
    Percent(f32),
}

/// Receives progress and answers Steam Guard challenges.
pub trait DownloadDelegate {
    fn on_progress(&mut self, progress: FetchProgress);
    /// Return the code to submit, or `None` to let the tool time out.
    /// Mobile confirmations return `None`; the user acts in the app.
    fn on_guard(&mut self, prompt: GuardPrompt) -> Option<String>;
}

/// Something recognized in the tool's console output.
#[derive(Debug, Clone, PartialEq)]
enum OutputSignal {
    Guard(GuardPrompt),
    Phase(&'static str),
    Percent(f32),
}

/// Client for the DepotDownloader executable.
pub struct DepotClient {
    exe: PathBuf,
    app_id: String,
    depot_id: String,
    game_exe_name: String,
    max_downloads: u32,
    in_flight: Mutex<()>,
}

impl DepotClient {
    pub fn new(game: &GameConfig, download: &DownloadConfig) -> Self {
        Self {
            exe: resolve_tool_path(download),
            app_id: game.app_id.clone(),
            depot_id: game.depot_id.clone(),
            game_exe_name: game.exe_name.clone(),
            max_downloads: download.max_downloads,
            in_flight: Mutex::new(()),
        }
    }

    /// Fetch one version into `<versions_root>/<safe name>`. Blocks until
    /// the tool finishes. Returns the final payload directory.
    pub fn fetch_version(
        &self,
        version: &VersionInfo,
        versions_root: &Path,
        creds: &Credentials,
        delegate: &mut dyn DownloadDelegate,
    ) -> Result<PathBuf, EngineError> {
        let _guard = self
            .in_flight
            .try_lock()
            .ok_or(EngineError::DownloadActive)?;

        let temp_dir = versions_root.join(format!("_temp_{}", version.manifest_id));
        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir)?;
        }
        fs::create_dir_all(&temp_dir)?;

        info!(
            "fetching '{}' (manifest {}) with {}",
            version.name,
            version.manifest_id,
            self.exe.display()
        );
        let mut child = Command::new(&self.exe)
            .args(["-app", &self.app_id, "-depot", &self.depot_id])
            .args(["-manifest", &version.manifest_id])
            .args(["-username", &creds.username, "-password", &creds.password])
            .arg("-remember-password")
            .arg("-dir")
            .arg(&temp_dir)
            .args(["-validate", "-os", "windows", "-osarch", "64"])
            .args(["-max-downloads", &self.max_downloads.to_string()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Download(format!("could not start the download tool: {e}")))?;

        let mut stdin = child.stdin.take();
        let (chunk_tx, chunk_rx) = unbounded::<(bool, String)>();

        // The tool prompts without trailing newlines, so both streams are
        // read in raw chunks rather than lines.
        let readers: Vec<_> = [
            child
                .stdout
                .take()
                .map(|s| (false, Box::new(s) as Box<dyn Read + Send>)),
            child
                .stderr
                .take()
                .map(|s| (true, Box::new(s) as Box<dyn Read + Send>)),
        ]
        .into_iter()
        .flatten()
        .map(|(is_err, mut stream)| {
            let tx = chunk_tx.clone();
            std::thread::spawn(move || {
                let mut buf = [0u8; 4096];
                while let Ok(n) = stream.read(&mut buf) {
                    if n == 0 {
                        break;
                    }
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if tx.send((is_err, chunk)).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();
        drop(chunk_tx);

        let mut stderr_text = String::new();
        for (is_err, chunk) in chunk_rx.iter() {
            if is_err {
                stderr_text.push_str(&chunk);
            }
            for signal in classify_output(&chunk) {
                match signal {
                    OutputSignal::Phase(phase) => {
                        delegate.on_progress(FetchProgress::Phase(phase.to_string()))
                    }
                    OutputSignal::Percent(pct) => {
                        delegate.on_progress(FetchProgress::Percent(pct))
                    }
                    OutputSignal::Guard(prompt) => {
                        if let Some(code) = delegate.on_guard(prompt) {
                            if let Some(stdin) = stdin.as_mut() {
                                let _ = writeln!(stdin, "{code}");
                            }
                        }
                    }
                }
            }
        }
        for reader in readers {
            let _ = reader.join();
        }

        let status = child
            .wait()
            .map_err(|e| EngineError::Download(format!("download tool failed: {e}")))?;

        if !status.success() {
            let _ = fs::remove_dir_all(&temp_dir);
            let reason = if stderr_text.trim().is_empty() {
                format!("tool exited with {status}")
            } else {
                stderr_text.trim().to_string()
            };
            return Err(EngineError::Download(reason));
        }

        finalize_download(&temp_dir, versions_root, &version.name, &self.game_exe_name)
    }
}

/// Move a validated temp download into its final payload directory. The
/// payload only counts when the game executable is present, whatever the
/// tool's exit status claimed.
fn finalize_download(
    temp_dir: &Path,
    versions_root: &Path,
    version_name: &str,
    exe_name: &str,
) -> Result<PathBuf, EngineError> {
    if !temp_dir.join(exe_name).exists() {
        let _ = fs::remove_dir_all(temp_dir);
        return Err(EngineError::Download(format!(
            "download finished but {exe_name} was not found"
        )));
    }
    let final_dir = versions_root.join(safe_folder_name(version_name));
    if final_dir.exists() {
        warn!("replacing existing payload at {}", final_dir.display());
        fs::remove_dir_all(&final_dir)?;
    }
    fs::rename(temp_dir, &final_dir)?;
    info!("payload ready at {}", final_dir.display());
    Ok(final_dir)
}

/// Recognize guard prompts, phase markers, and progress percentages in a
/// chunk of tool output.
fn classify_output(chunk: &str) -> Vec<OutputSignal> {
    let mut signals = Vec::new();
    if chunk.contains("auth code sent to the email") {
        signals.push(OutputSignal::Guard(GuardPrompt::EmailCode));
    } else if chunk.contains("Enter 2FA code:") {
        signals.push(OutputSignal::Guard(GuardPrompt::TwoFactorCode));
    } else if chunk.contains("Use the Steam Mobile App") {
        signals.push(OutputSignal::Guard(GuardPrompt::MobileConfirm));
    } else if chunk.contains("Logging") {
        signals.push(OutputSignal::Phase("Logging in to Steam..."));
    } else if chunk.contains("Processing depot") {
        signals.push(OutputSignal::Phase("Processing depot..."));
    } else if chunk.contains("Downloading depot") {
        signals.push(OutputSignal::Phase("Starting download..."));
    } else if chunk.contains("Depot download complete") {
        signals.push(OutputSignal::Phase("Finalizing files..."));
    }

    let percent = Regex::new(r"(\d+\.\d+)%").expect("static regex");
    if let Some(caps) = percent.captures(chunk) {
        if let Ok(pct) = caps[1].parse::<f32>() {
            signals.push(OutputSignal::Percent(pct));
        }
    }
    signals
}

/// Resolve the DepotDownloader executable: explicit config path, then a
/// copy next to our own binary, then PATH.
fn resolve_tool_path(download: &DownloadConfig) -> PathBuf {
    if let Some(path) = &download.depot_downloader_path {
        return path.clone();
    }
    let name = if cfg!(windows) {
        "DepotDownloader.exe"
    } else {
        "DepotDownloader"
    };
    if let Ok(own) = std::env::current_exe() {
        if let Some(dir) = own.parent() {
            let sibling = dir.join(name);
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classify_guard_prompts() {
        assert_eq!(
            classify_output("STEAM GUARD! auth code sent to the email at x@y.z"),
            vec![OutputSignal::Guard(GuardPrompt::EmailCode)]
        );
        assert_eq!(
            classify_output("Please Enter 2FA code: "),
            vec![OutputSignal::Guard(GuardPrompt::TwoFactorCode)]
        );
        assert_eq!(
            classify_output("Use the Steam Mobile App to confirm your sign in..."),
            vec![OutputSignal::Guard(GuardPrompt::MobileConfirm)]
        );
    }

    #[test]
    fn test_classify_phases_and_progress() {
        assert_eq!(
            classify_output("Logging 'user' into Steam3..."),
            vec![OutputSignal::Phase("Logging in to Steam...")]
        );
        assert_eq!(
            classify_output(" 42.37% some-file.dat"),
            vec![OutputSignal::Percent(42.37)]
        );
        // A chunk can carry both a phase marker and a percentage.
        let signals = classify_output("Downloading depot 585421\n 00.10% first.dat");
        assert_eq!(
            signals,
            vec![
                OutputSignal::Phase("Starting download..."),
                OutputSignal::Percent(0.10)
            ]
        );
        assert!(classify_output("nothing interesting").is_empty());
    }

    #[test]
    fn test_finalize_requires_executable() {
        let tmp = TempDir::new().unwrap();
        let temp_dir = tmp.path().join("_temp_42");
        fs::create_dir_all(&temp_dir).unwrap();
        fs::write(temp_dir.join("readme.txt"), "not a game").unwrap();

        let err =
            finalize_download(&temp_dir, tmp.path(), "1.0 Release", "Trailmakers.exe").unwrap_err();
        assert!(matches!(err, EngineError::Download(_)));
        // The incomplete temp dir is cleaned up.
        assert!(!temp_dir.exists());
    }

    #[test]
    fn test_finalize_moves_payload_into_place() {
        let tmp = TempDir::new().unwrap();
        let temp_dir = tmp.path().join("_temp_42");
        fs::create_dir_all(&temp_dir).unwrap();
        fs::write(temp_dir.join("Trailmakers.exe"), "game").unwrap();

        let final_dir =
            finalize_download(&temp_dir, tmp.path(), "1.0 Release", "Trailmakers.exe").unwrap();

        assert_eq!(final_dir, tmp.path().join("Trailmakers 1.0 Release"));
        assert!(final_dir.join("Trailmakers.exe").exists());
        assert!(!temp_dir.exists());
    }

    #[test]
    fn test_finalize_replaces_stale_payload() {
        let tmp = TempDir::new().unwrap();
        let temp_dir = tmp.path().join("_temp_42");
        fs::create_dir_all(&temp_dir).unwrap();
        fs::write(temp_dir.join("Trailmakers.exe"), "new").unwrap();

        let stale = tmp.path().join("Trailmakers 1.0 Release");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("Trailmakers.exe"), "old").unwrap();

        finalize_download(&temp_dir, tmp.path(), "1.0 Release", "Trailmakers.exe").unwrap();
        assert_eq!(
            fs::read_to_string(stale.join("Trailmakers.exe")).unwrap(),
            "new"
        );
    }
}
