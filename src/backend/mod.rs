//! Multiplexer backend: the session/window/pane primitives pgm orchestrates.

#[cfg(test)]
pub(crate) mod fake;
pub mod tmux;

pub use tmux::Tmux;

use crate::error::Result;

/// Oldest tmux release with the format variables and options pgm relies on.
pub const MIN_VERSION: (u32, u32) = (2, 6);

/// Named control keys understood by `send-keys`.
pub mod keys {
    pub const ENTER: &str = "Enter";
    pub const INTERRUPT: &str = "C-c";
    pub const EOF: &str = "C-d";
    pub const QUIT: &str = "C-\\";
}

/// Exact-match target for a session.
pub fn session_target(session: &str) -> String {
    format!("={session}")
}

/// Exact-match target for one window of a session.
pub fn window_target(session: &str, slot: u32) -> String {
    format!("={session}:{slot}")
}

/// The primitives pgm consumes from a terminal multiplexer.
///
/// Every call blocks until the backend answers. Sequences of calls are not
/// atomic; callers re-query before acting instead of caching state.
pub trait Multiplexer {
    /// Raw version string as printed by the backend.
    fn version(&self) -> Result<String>;

    fn has_session(&self, session: &str) -> Result<bool>;
    /// Creates a detached session whose first window is the control shell.
    fn new_session(&self, session: &str) -> Result<()>;
    fn kill_session(&self, session: &str) -> Result<()>;
    /// Session names in backend order; empty when no server is running.
    fn list_sessions(&self) -> Result<Vec<String>>;

    /// Creates a detached window at `slot` running the default shell.
    fn new_window(&self, session: &str, slot: u32, name: &str) -> Result<()>;
    /// Replaces whatever runs in the window's pane with `command`.
    fn respawn_pane(&self, target: &str, command: &str) -> Result<()>;
    /// One line per window, rendered with `format`.
    fn list_windows(&self, session: &str, format: &str) -> Result<Vec<String>>;
    fn kill_window(&self, target: &str) -> Result<()>;
    fn set_window_option(&self, target: &str, option: &str, value: &str) -> Result<()>;
    fn select_window(&self, target: &str) -> Result<()>;

    /// Text snapshot of the pane; `history` includes the scrollback.
    fn capture_pane(&self, target: &str, history: bool) -> Result<String>;
    /// Sends `keys` either as literal text or as named keys (`C-c`, `Enter`).
    fn send_keys(&self, target: &str, keys: &str, literal: bool) -> Result<()>;

    /// Creates a detached session sharing the windows of `group`.
    fn new_grouped_session(&self, session: &str, group: &str) -> Result<()>;
    /// Attaches the operator's terminal; returns when they detach.
    fn attach(&self, session: &str) -> Result<()>;

    /// Sends a hard kill signal straight to a pane's process.
    fn signal_pid(&self, pid: u32) -> Result<()>;
}

/// Parses `tmux -V` output into `(major, minor)`.
///
/// Returns `None` for builds without a numeric version (e.g. `tmux master`).
pub fn parse_version(output: &str) -> Option<(u32, u32)> {
    let raw = output.split_whitespace().nth(1)?;
    let raw = raw.strip_prefix("next-").unwrap_or(raw);

    let mut parts = raw.splitn(2, '.');
    let major = parts.next()?.parse().ok()?;
    let minor_digits: String = parts
        .next()
        .unwrap_or("0")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let minor = minor_digits.parse().unwrap_or(0);

    Some((major, minor))
}

/// Fails with an environment error when the backend is older than [`MIN_VERSION`].
pub fn check_version(backend: &dyn Multiplexer) -> Result<()> {
    let output = backend.version()?;
    match parse_version(&output) {
        Some(found) if found < MIN_VERSION => Err(crate::PgmError::Environment(format!(
            "tmux {}.{} or newer is required (found '{}')",
            MIN_VERSION.0,
            MIN_VERSION.1,
            output.trim()
        ))),
        Some(_) => Ok(()),
        None => {
            tracing::debug!(version = %output.trim(), "unrecognised tmux version, assuming recent");
            Ok(())
        }
    }
}
