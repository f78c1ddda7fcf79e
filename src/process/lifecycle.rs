//! Lifecycle controller: stop, remove, and their "all" variants.

use super::{Inspector, Process};
use crate::backend::{keys, window_target, Multiplexer};
use crate::error::{PgmError, Result};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopSignal {
    /// Ctrl-C keystroke
    #[default]
    Interrupt,
    /// Ctrl-D keystroke
    Eof,
    /// Ctrl-\ keystroke
    Quit,
    /// SIGKILL to the pane's process
    ForceKill,
}

/// A single process or every process of the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Name(String),
    All,
}

/// Per-item results of an "all" operation.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, PgmError)>,
}

impl BulkOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// `Err(Bulk)` naming every failed item, if there were any.
    pub fn into_result(self, operation: &str) -> Result<Self> {
        if self.failed.is_empty() {
            return Ok(self);
        }
        Err(PgmError::Bulk {
            operation: operation.to_string(),
            failed: self.failed.iter().map(|(name, _)| name.clone()).collect(),
        })
    }
}

pub struct Lifecycle<'a> {
    tmux: &'a dyn Multiplexer,
}

impl<'a> Lifecycle<'a> {
    pub fn new(tmux: &'a dyn Multiplexer) -> Self {
        Self { tmux }
    }

    fn inspector(&self) -> Inspector<'a> {
        Inspector::new(self.tmux)
    }

    fn signal(&self, group: &str, process: &Process, signal: StopSignal) -> Result<()> {
        let target = window_target(group, process.slot);
        match signal {
            StopSignal::Interrupt => self.tmux.send_keys(&target, keys::INTERRUPT, false),
            StopSignal::Eof => self.tmux.send_keys(&target, keys::EOF, false),
            StopSignal::Quit => self.tmux.send_keys(&target, keys::QUIT, false),
            StopSignal::ForceKill => match process.pid {
                Some(pid) => self.tmux.signal_pid(pid),
                None => Err(PgmError::conflict(format!(
                    "process '{}' has no process id yet; try again or use a keystroke signal",
                    process.name
                ))),
            },
        }?;
        info!(group, name = %process.name, ?signal, "stop signal sent");
        Ok(())
    }

    /// Signal one process. It must exist and still be running.
    pub fn stop(&self, group: &str, name: &str, signal: StopSignal) -> Result<()> {
        let process = self.inspector().find(group, name)?;
        if !process.is_running() {
            return Err(PgmError::conflict(format!(
                "process '{name}' has already {}",
                process.status
            )));
        }
        self.signal(group, &process, signal)
    }

    /// Signal every running process; exited ones are skipped.
    pub fn stop_all(&self, group: &str, signal: StopSignal) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for process in self.inspector().list_processes(group)? {
            if !process.is_running() {
                outcome.skipped.push(process.name);
                continue;
            }
            match self.signal(group, &process, signal) {
                Ok(()) => outcome.succeeded.push(process.name),
                Err(e) => {
                    warn!(group, name = %process.name, error = %e, "stop failed");
                    outcome.failed.push((process.name, e));
                }
            }
        }
        Ok(outcome)
    }

    /// Remove one exited process's window.
    pub fn remove(&self, group: &str, name: &str) -> Result<()> {
        let process = self.inspector().find(group, name)?;
        if process.is_running() {
            return Err(PgmError::conflict(format!(
                "process '{name}' is still running; stop it first"
            )));
        }
        self.tmux.kill_window(&window_target(group, process.slot))?;
        info!(group, name, "process removed");
        Ok(())
    }

    /// Remove every exited process; running ones are skipped.
    pub fn remove_all(&self, group: &str) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for process in self.inspector().list_processes(group)? {
            if process.is_running() {
                outcome.skipped.push(process.name);
                continue;
            }
            match self.tmux.kill_window(&window_target(group, process.slot)) {
                Ok(()) => outcome.succeeded.push(process.name),
                Err(e) => outcome.failed.push((process.name, e)),
            }
        }
        Ok(outcome)
    }

    /// Stop, then remove whatever the stop succeeded on.
    ///
    /// Keystroke signals are asynchronous, so the process may still be
    /// running when `remove` re-checks it. That surfaces as a state conflict
    /// rather than a wait.
    pub fn stop_and_remove(
        &self,
        group: &str,
        target: &Target,
        signal: StopSignal,
    ) -> Result<BulkOutcome> {
        match target {
            Target::Name(name) => {
                self.stop(group, name, signal)?;
                self.remove(group, name)?;
                Ok(BulkOutcome {
                    succeeded: vec![name.clone()],
                    ..BulkOutcome::default()
                })
            }
            Target::All => {
                let stopped = self.stop_all(group, signal)?;
                let mut outcome = BulkOutcome {
                    skipped: stopped.skipped,
                    failed: stopped.failed,
                    ..BulkOutcome::default()
                };
                for name in stopped.succeeded {
                    match self.remove(group, &name) {
                        Ok(()) => outcome.succeeded.push(name),
                        Err(e) => outcome.failed.push((name, e)),
                    }
                }
                Ok(outcome)
            }
        }
    }

    /// Dispatch on `target` for a plain stop.
    pub fn stop_target(
        &self,
        group: &str,
        target: &Target,
        signal: StopSignal,
    ) -> Result<BulkOutcome> {
        match target {
            Target::Name(name) => {
                self.stop(group, name, signal)?;
                Ok(BulkOutcome {
                    succeeded: vec![name.clone()],
                    ..BulkOutcome::default()
                })
            }
            Target::All => self.stop_all(group, signal),
        }
    }

    /// Dispatch on `target` for a plain remove.
    pub fn remove_target(&self, group: &str, target: &Target) -> Result<BulkOutcome> {
        match target {
            Target::Name(name) => {
                self.remove(group, name)?;
                Ok(BulkOutcome {
                    succeeded: vec![name.clone()],
                    ..BulkOutcome::default()
                })
            }
            Target::All => self.remove_all(group),
        }
    }
}
