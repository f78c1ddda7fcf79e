//! `Multiplexer` implementation that shells out to the tmux binary.

use super::{session_target, Multiplexer};
use crate::error::{PgmError, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io::ErrorKind as IoErrorKind;
use std::process::{Command, Output};
use tracing::debug;

/// Stderr fragments meaning "nothing there" rather than a failure.
const ABSENT_MARKERS: [&str; 4] = [
    "no server running",
    "error connecting to",
    "can't find session",
    "no sessions",
];

/// A tmux client bound to one binary and (optionally) one server socket.
#[derive(Debug, Clone)]
pub struct Tmux {
    binary: String,
    socket: Option<String>,
}

impl Default for Tmux {
    fn default() -> Self {
        Self::new("tmux", None)
    }
}

impl Tmux {
    pub fn new(binary: impl Into<String>, socket: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            socket,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(socket) = &self.socket {
            cmd.arg("-L").arg(socket);
        }
        cmd
    }

    fn describe(&self, args: &[&str]) -> String {
        let mut parts = vec![self.binary.as_str()];
        parts.extend_from_slice(args);
        parts.join(" ")
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, "tmux");
        self.command().args(args).output().map_err(|e| {
            if e.kind() == IoErrorKind::NotFound {
                PgmError::Environment(format!("'{}' not found in PATH", self.binary))
            } else {
                PgmError::Io(e)
            }
        })
    }

    /// Runs a command and returns its stdout, failing on non-zero exit.
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(PgmError::Backend {
                command: self.describe(args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Like [`Tmux::run`], but maps "no such server/session" to `None`.
    fn run_optional(&self, args: &[&str]) -> Result<Option<String>> {
        let output = self.output(args)?;
        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if ABSENT_MARKERS.iter().any(|m| stderr.contains(m)) {
            return Ok(None);
        }
        Err(PgmError::Backend {
            command: self.describe(args),
            stderr: stderr.trim().to_string(),
        })
    }
}

impl Multiplexer for Tmux {
    fn version(&self) -> Result<String> {
        self.run(&["-V"])
    }

    fn has_session(&self, session: &str) -> Result<bool> {
        let target = session_target(session);
        Ok(self.run_optional(&["has-session", "-t", target.as_str()])?.is_some())
    }

    fn new_session(&self, session: &str) -> Result<()> {
        self.run(&["new-session", "-d", "-s", session, "-n", "control"])
            .map(drop)
    }

    fn kill_session(&self, session: &str) -> Result<()> {
        let target = session_target(session);
        self.run(&["kill-session", "-t", target.as_str()]).map(drop)
    }

    fn list_sessions(&self) -> Result<Vec<String>> {
        let out = self.run_optional(&["list-sessions", "-F", "#{session_name}"])?;
        Ok(out
            .unwrap_or_default()
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn new_window(&self, session: &str, slot: u32, name: &str) -> Result<()> {
        let target = super::window_target(session, slot);
        self.run(&["new-window", "-d", "-t", target.as_str(), "-n", name])
            .map(drop)
    }

    fn respawn_pane(&self, target: &str, command: &str) -> Result<()> {
        self.run(&["respawn-pane", "-k", "-t", target, command])
            .map(drop)
    }

    fn list_windows(&self, session: &str, format: &str) -> Result<Vec<String>> {
        let target = session_target(session);
        let out = self.run(&["list-windows", "-t", target.as_str(), "-F", format])?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn kill_window(&self, target: &str) -> Result<()> {
        self.run(&["kill-window", "-t", target]).map(drop)
    }

    fn set_window_option(&self, target: &str, option: &str, value: &str) -> Result<()> {
        self.run(&["set-window-option", "-t", target, option, value])
            .map(drop)
    }

    fn select_window(&self, target: &str) -> Result<()> {
        self.run(&["select-window", "-t", target]).map(drop)
    }

    fn capture_pane(&self, target: &str, history: bool) -> Result<String> {
        let mut args = vec!["capture-pane", "-p", "-J", "-t", target];
        if history {
            args.extend_from_slice(&["-S", "-"]);
        }
        self.run(&args)
    }

    fn send_keys(&self, target: &str, keys: &str, literal: bool) -> Result<()> {
        let mut args = vec!["send-keys", "-t", target];
        if literal {
            args.push("-l");
        }
        // Keys may start with '-'
        args.extend_from_slice(&["--", keys]);
        self.run(&args).map(drop)
    }

    fn new_grouped_session(&self, session: &str, group: &str) -> Result<()> {
        let target = session_target(group);
        self.run(&["new-session", "-d", "-s", session, "-t", target.as_str()])
            .map(drop)
    }

    fn attach(&self, session: &str) -> Result<()> {
        let target = session_target(session);
        debug!(session, "attaching");
        let status = self
            .command()
            .args(["attach-session", "-t", target.as_str()])
            .env_remove("TMUX")
            .status()?;
        if !status.success() {
            return Err(PgmError::Backend {
                command: self.describe(&["attach-session", "-t", target.as_str()]),
                stderr: format!("exited with {status}"),
            });
        }
        Ok(())
    }

    fn signal_pid(&self, pid: u32) -> Result<()> {
        // pid 0 would signal pgm's own process group
        let raw = i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .ok_or_else(|| PgmError::Backend {
                command: format!("kill -KILL {pid}"),
                stderr: "refusing to signal an invalid process id".to_string(),
            })?;
        debug!(pid, "sending SIGKILL");
        kill(Pid::from_raw(raw), Signal::SIGKILL).map_err(|errno| PgmError::Backend {
            command: format!("kill -KILL {pid}"),
            stderr: errno.desc().to_string(),
        })
    }
}
