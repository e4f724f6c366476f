//! Engine events for the presentation layer

use crate::session::SessionState;

/// Messages sent from the engine to whatever front end is listening.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The state machine moved to a new state.
    StateChanged(SessionState),
    /// Human-readable progress line.
    Status(String),
    /// The game process was confirmed started.
    GameLaunched(String),
    /// The game session finished and files were restored.
    GameClosed(String),
    /// A handled failure; the engine has already cleaned up.
    Error(String),
}
