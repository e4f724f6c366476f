//! Engine error types
//!
//! Typed failure kinds for the reconciliation engine so callers can branch
//! on what went wrong. Lock contention during tree traversal is not an
//! error; it is recovered in place (see `fsops`).

use std::io;
use std::path::PathBuf;

/// Errors surfaced by the version engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No Steam installation containing the game executable was found.
    #[error("no Trailmakers installation found under Steam")]
    InstallNotFound,

    /// The version's downloaded payload is missing from the archive.
    #[error("no downloaded payload for '{0}'; fetch it first")]
    MissingPayload(String),

    /// The requested version name is not in the catalog.
    #[error("unknown version '{0}'")]
    UnknownVersion(String),

    /// A play request arrived while a session was already in progress.
    #[error("a session is already active")]
    SessionActive,

    /// Shutdown or reset was requested while the game may still hold files.
    #[error("the game is still running; close it first")]
    GameRunning,

    /// The external launcher could not start the game.
    #[error("launch failed: {0}")]
    Launch(String),

    /// Restoring the canonical directories failed partway. The
    /// modification flag stays set until a restore completes.
    #[error("restore of {} incomplete; files may not match factory state", path.display())]
    Restore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The download tool failed or produced an invalid payload.
    #[error("download failed: {0}")]
    Download(String),

    /// A second download was requested while one was running.
    #[error("a download is already in progress")]
    DownloadActive,

    #[error(transparent)]
    Io(#[from] io::Error),
}
