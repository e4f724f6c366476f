//! Process Exit Detection
//!
//! Two ways to answer "is the game still running": a child handle we own
//! (direct launch) or a process-table scan by executable name (Steam
//! launch). Transient gaps in the process table are handled by the
//! debounce counter in the session engine, not here.

use std::process::Child;
use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

use crate::launch::LaunchHandle;

/// A single liveness sample of the game process.
pub trait ProcessWatcher: Send {
    fn is_running(&mut self) -> bool;
}

/// Watches a child process we spawned ourselves.
pub struct ChildWatcher {
    child: Child,
    exited: bool,
}

impl ChildWatcher {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            exited: false,
        }
    }
}

impl ProcessWatcher for ChildWatcher {
    fn is_running(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("game exited with {status}");
                self.exited = true;
                false
            }
            Ok(None) => true,
            // If the handle is broken we cannot learn more by retrying.
            Err(_) => {
                self.exited = true;
                false
            }
        }
    }
}

/// Scans the OS process table for an executable name. Used when the game
/// was launched through Steam and we own no handle to it.
pub struct NamedProcessWatcher {
    system: System,
    exe_name: String,
}

impl NamedProcessWatcher {
    pub fn new(exe_name: impl Into<String>) -> Self {
        Self {
            system: System::new(),
            exe_name: exe_name.into(),
        }
    }
}

impl ProcessWatcher for NamedProcessWatcher {
    fn is_running(&mut self) -> bool {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        self.system
            .processes()
            .values()
            .any(|p| p.name().eq_ignore_ascii_case(self.exe_name.as_str()))
    }
}

/// Pick the watcher matching how the game was launched.
pub fn watcher_for(handle: LaunchHandle, exe_name: &str) -> Box<dyn ProcessWatcher> {
    match handle {
        LaunchHandle::Direct(child) => Box::new(ChildWatcher::new(child)),
        LaunchHandle::Detached => Box::new(NamedProcessWatcher::new(exe_name)),
    }
}
