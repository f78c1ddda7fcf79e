//! Processes running inside a group's windows

pub mod inspector;
pub mod launcher;
pub mod lifecycle;

pub use inspector::{parse_window_line, Inspector, WindowRecord};
pub use launcher::{allocate_slot, compose_command, LaunchRequest, Launched, Launcher};
pub use lifecycle::{BulkOutcome, Lifecycle, StopSignal, Target};

use crate::error::{PgmError, Result};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Slot occupied by the group's control shell.
pub const CONTROL_SLOT: u32 = 0;

/// How the command reaches the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// The command is the window's process.
    #[default]
    Exec,
    /// The command is typed into an interactive shell.
    Shell,
}

impl ExecMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecMode::Exec => "exec",
            ExecMode::Shell => "shell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    #[default]
    Normal,
    Sudo,
}

/// Run state as observed from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "code", rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    /// `None` when the process died from a signal.
    Exited(Option<i32>),
}

impl RunStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Exited(Some(code)) => write!(f, "exited ({code})"),
            RunStatus::Exited(None) => write!(f, "exited (signal)"),
        }
    }
}

/// A named command occupying one window slot of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Process {
    pub name: String,
    pub slot: u32,
    pub command: String,
    pub mode: ExecMode,
    pub privilege: Privilege,
    pub workdir: Option<PathBuf>,
    pub status: RunStatus,
    pub pid: Option<u32>,
}

impl Process {
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }
}

/// Validate a group or process name: it ends up inside backend targets.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(PgmError::validation(format!(
            "invalid {kind} name '{name}' (use alphanumeric, dash, underscore)"
        )));
    }
    Ok(())
}
