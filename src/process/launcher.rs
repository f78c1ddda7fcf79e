//! Process launcher: slot allocation, command composition, window creation.

use super::inspector::{OPT_COMMAND, OPT_DIR, OPT_MODE, OPT_SUDO};
use super::{validate_name, ExecMode, Inspector, Privilege};
use crate::backend::{keys, window_target, Multiplexer};
use crate::config::expand_tilde;
use crate::credential::{is_privileged, Clock, Credential, CredentialRelay, SUDO_PROMPT};
use crate::error::{PgmError, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything needed to start one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub name: String,
    pub command: String,
    pub mode: ExecMode,
    pub privilege: Privilege,
    pub workdir: Option<PathBuf>,
}

impl LaunchRequest {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            mode: ExecMode::Exec,
            privilege: Privilege::Normal,
            workdir: None,
        }
    }

    pub fn is_sudo(&self) -> bool {
        self.privilege == Privilege::Sudo
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launched {
    pub slot: u32,
    pub name: String,
}

/// Lowest non-negative index not in `used`, which must be sorted and unique.
pub fn allocate_slot(used: &[u32]) -> u32 {
    used.iter()
        .zip(0u32..)
        .find(|(slot, i)| **slot != *i)
        .map(|(_, i)| i)
        .unwrap_or(used.len() as u32)
}

/// Escape a string for safe use in single-quoted shell arguments.
fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// The text that ends up running in the window.
///
/// Elevated commands go through `sudo -k -S`: cached credentials are
/// dropped and the password is read from stdin after [`SUDO_PROMPT`].
pub fn compose_command(command: &str, elevate: bool) -> String {
    if elevate {
        format!("sudo -k -S -p {} {command}", shell_escape(SUDO_PROMPT))
    } else {
        command.to_string()
    }
}

fn has_inline_elevation(command: &str) -> bool {
    command.split_whitespace().next() == Some("sudo")
}

fn resolve_workdir(dir: &Path) -> Result<PathBuf> {
    let expanded = expand_tilde(&dir.to_string_lossy());
    let resolved = expanded.canonicalize().map_err(|e| {
        PgmError::validation(format!(
            "working directory '{}' is not usable: {e}",
            expanded.display()
        ))
    })?;
    if !resolved.is_dir() {
        return Err(PgmError::validation(format!(
            "working directory '{}' is not a directory",
            resolved.display()
        )));
    }
    Ok(resolved)
}

/// Switches pgm's own working directory and restores it on drop.
///
/// The backend client starts new windows in its caller's directory. This is
/// process-global state: launches must not run concurrently.
struct WorkdirGuard {
    previous: PathBuf,
}

impl WorkdirGuard {
    fn enter(dir: &Path) -> Result<Self> {
        let previous = env::current_dir()?;
        env::set_current_dir(dir)?;
        debug!(dir = %dir.display(), "changed working directory");
        Ok(Self { previous })
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.previous);
    }
}

pub struct Launcher<'a> {
    tmux: &'a dyn Multiplexer,
    clock: &'a dyn Clock,
    privileged: bool,
}

impl<'a> Launcher<'a> {
    pub fn new(tmux: &'a dyn Multiplexer, clock: &'a dyn Clock) -> Self {
        Self {
            tmux,
            clock,
            privileged: is_privileged(),
        }
    }

    /// Override root detection.
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Whether launching `request` requires a password from the operator.
    pub fn needs_credential(&self, request: &LaunchRequest) -> bool {
        request.is_sudo() && !self.privileged
    }

    /// Start `request` in a new window of `group`.
    ///
    /// Nothing is rolled back on failure: once the window exists it stays,
    /// even if the credential relay times out afterwards.
    pub fn launch(
        &self,
        group: &str,
        request: &LaunchRequest,
        credential: Option<Credential>,
    ) -> Result<Launched> {
        validate_name("process", &request.name)?;
        let inspector = Inspector::new(self.tmux);
        let windows = inspector.windows(group)?;
        if windows
            .iter()
            .any(|w| w.slot != super::CONTROL_SLOT && w.name == request.name)
        {
            return Err(PgmError::validation(format!(
                "process '{}' already exists in group '{group}'",
                request.name
            )));
        }

        if request.is_sudo() && has_inline_elevation(&request.command) {
            return Err(PgmError::validation(
                "use the --sudo flag, not an inline 'sudo' prefix",
            ));
        }
        if request.command.trim().is_empty() {
            return Err(PgmError::validation("command is empty"));
        }

        let elevate = self.needs_credential(request);
        let credential = match credential {
            Some(c) if elevate => Some(c),
            None if elevate => {
                return Err(PgmError::credential(format!(
                    "'{}' needs sudo but no confirmed password was supplied",
                    request.name
                )))
            }
            _ => None,
        };

        let workdir = request.workdir.as_deref().map(resolve_workdir).transpose()?;

        let slot = {
            let _cwd = workdir.as_deref().map(WorkdirGuard::enter).transpose()?;
            let mut used: Vec<u32> = windows.iter().map(|w| w.slot).collect();
            used.sort_unstable();
            let slot = allocate_slot(&used);
            self.create_window(group, slot, request, elevate, workdir.as_deref())?;
            slot
        };
        info!(group, name = %request.name, slot, "process launched");

        if let Some(credential) = credential {
            CredentialRelay::new(self.tmux, self.clock)
                .relay(&window_target(group, slot), credential)?;
        }

        Ok(Launched {
            slot,
            name: request.name.clone(),
        })
    }

    fn create_window(
        &self,
        group: &str,
        slot: u32,
        request: &LaunchRequest,
        elevate: bool,
        workdir: Option<&Path>,
    ) -> Result<()> {
        let command = compose_command(&request.command, elevate);
        let target = window_target(group, slot);

        // The window starts as an idle shell so its options are in place
        // before the command runs; a command that exits at once still leaves
        // its pane behind.
        self.tmux.new_window(group, slot, &request.name)?;
        self.tmux
            .set_window_option(&target, "remain-on-exit", "on")?;
        self.tmux
            .set_window_option(&target, "aggressive-resize", "on")?;
        self.tmux
            .set_window_option(&target, OPT_COMMAND, &request.command)?;
        self.tmux
            .set_window_option(&target, OPT_MODE, request.mode.as_str())?;
        if request.is_sudo() {
            self.tmux.set_window_option(&target, OPT_SUDO, "1")?;
        }
        if let Some(dir) = workdir {
            self.tmux
                .set_window_option(&target, OPT_DIR, &dir.to_string_lossy())?;
        }

        match request.mode {
            ExecMode::Exec => self.tmux.respawn_pane(&target, &command)?,
            ExecMode::Shell => {
                // Metacharacters reach the shell unescaped; that is what
                // shell mode is for.
                self.tmux.send_keys(&target, &command, true)?;
                self.tmux.send_keys(&target, keys::ENTER, false)?;
            }
        }
        Ok(())
    }
}
