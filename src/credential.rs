//! Credential relay for privileged launches.
//!
//! A privileged command is wrapped so that sudo reads the password from stdin
//! and prints [`SUDO_PROMPT`] instead of its usual prompt. Once that prompt is
//! the last line of the window, the password is typed into the window as
//! literal keystrokes. The password never touches disk or a terminal we own.

use crate::backend::{keys, Multiplexer};
use crate::error::{PgmError, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Prompt printed by the elevation wrapper; matched verbatim.
pub const SUDO_PROMPT: &str = "[pgm] sudo password:";

pub const RELAY_ATTEMPTS: u32 = 5;
pub const RELAY_INTERVAL: Duration = Duration::from_secs(1);

/// True when the operator already runs as root.
pub fn is_privileged() -> bool {
    nix::unistd::geteuid().is_root()
}

/// A confirmed password, used for exactly one privileged launch.
pub struct Credential(String);

impl Credential {
    /// Accept a password only if both entries match.
    pub fn confirm(first: String, second: String) -> Result<Self> {
        let first = Credential(first);
        let second = Credential(second);
        if first.0 != second.0 {
            return Err(PgmError::credential("passwords do not match"));
        }
        Ok(first)
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(..)")
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        bytes.fill(0);
        std::hint::black_box(&bytes);
    }
}

/// Restores cooked mode even if reading fails halfway.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Read one line from the terminal without echoing it.
fn read_hidden(prompt: &str) -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    let mut value = String::new();
    {
        let _raw = RawModeGuard::enable()?;
        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Enter => break,
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    drop(Credential(value));
                    write!(stderr, "\r\n")?;
                    return Err(PgmError::credential("password entry cancelled"));
                }
                KeyCode::Char(c) => value.push(c),
                KeyCode::Backspace => {
                    value.pop();
                }
                _ => {}
            }
        }
    }
    writeln!(stderr)?;
    Ok(value)
}

/// Ask twice for the sudo password of a privileged process.
pub fn prompt_confirmed(process: &str) -> Result<Credential> {
    let first = read_hidden(&format!("sudo password for '{process}': "))?;
    let second = read_hidden("confirm password: ")?;
    Credential::confirm(first, second)
}

/// Source of waiting, so the relay's timeout is testable without real sleeps.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Start,
    AwaitPrompt { attempt: u32 },
    Sent,
    Done,
    Timeout,
}

/// Types a credential into a window once the sudo prompt shows up.
pub struct CredentialRelay<'a> {
    tmux: &'a dyn Multiplexer,
    clock: &'a dyn Clock,
    interval: Duration,
    attempts: u32,
}

impl<'a> CredentialRelay<'a> {
    pub fn new(tmux: &'a dyn Multiplexer, clock: &'a dyn Clock) -> Self {
        Self {
            tmux,
            clock,
            interval: RELAY_INTERVAL,
            attempts: RELAY_ATTEMPTS,
        }
    }

    fn prompt_visible(&self, target: &str) -> Result<bool> {
        let screen = self.tmux.capture_pane(target, false)?;
        let last = screen.lines().rev().find(|l| !l.trim().is_empty());
        Ok(last.is_some_and(|l| l.trim_end() == SUDO_PROMPT))
    }

    /// Relay `credential` into `target`. The credential is consumed either way.
    ///
    /// On timeout the window is left as it is; its command may already have
    /// produced output worth keeping.
    pub fn relay(&self, target: &str, credential: Credential) -> Result<()> {
        let mut state = RelayState::Start;
        loop {
            debug!(?state, target, "credential relay");
            state = match state {
                RelayState::Start => RelayState::AwaitPrompt { attempt: 1 },
                RelayState::AwaitPrompt { attempt } => {
                    self.clock.sleep(self.interval);
                    if self.prompt_visible(target)? {
                        RelayState::Sent
                    } else if attempt >= self.attempts {
                        RelayState::Timeout
                    } else {
                        RelayState::AwaitPrompt {
                            attempt: attempt + 1,
                        }
                    }
                }
                RelayState::Sent => {
                    self.tmux.send_keys(target, credential.expose(), true)?;
                    self.tmux.send_keys(target, keys::ENTER, false)?;
                    RelayState::Done
                }
                RelayState::Done => {
                    info!(target, "password relayed");
                    return Ok(());
                }
                RelayState::Timeout => {
                    warn!(target, "sudo prompt never appeared");
                    return Err(PgmError::credential(format!(
                        "sudo prompt did not appear in {target} after {} attempts; \
                         the window was left in place, remove it once it exits",
                        self.attempts
                    )));
                }
            };
        }
    }
}
