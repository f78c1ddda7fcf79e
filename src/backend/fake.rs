//! In-memory multiplexer used by unit tests.

use super::Multiplexer;
use crate::error::{PgmError, Result};
use crate::process::inspector::{FIELD_DELIMITER, OPT_COMMAND, OPT_DIR, OPT_MODE, OPT_SUDO};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;

const REMAIN_ON_EXIT: &str = "remain-on-exit";

#[derive(Debug, Clone, Default)]
pub struct FakeWindow {
    pub name: String,
    /// 0 renders as an empty `pane_pid`.
    pub pid: u32,
    pub dead: bool,
    pub exit_code: Option<i32>,
    /// Command the pane runs; `None` for the default shell.
    pub command: Option<String>,
    pub options: BTreeMap<String, String>,
    /// Working directory of pgm itself when the window was created.
    pub cwd: Option<PathBuf>,
}

pub struct FakeBackend {
    version: String,
    sessions: RefCell<BTreeMap<String, BTreeMap<u32, FakeWindow>>>,
    exits_on_start: RefCell<Vec<(String, i32)>>,
    captures: RefCell<VecDeque<String>>,
    capture_calls: Cell<usize>,
    keys: RefCell<Vec<(String, String, bool)>>,
    killed_pids: RefCell<Vec<u32>>,
    failing_pids: RefCell<HashSet<u32>>,
    attached: RefCell<Vec<String>>,
    next_pid: Cell<u32>,
}

fn backend_error(command: &str, stderr: &str) -> PgmError {
    PgmError::Backend {
        command: command.to_string(),
        stderr: stderr.to_string(),
    }
}

/// Splits `=session:slot` / `=session` into its parts.
fn parse_target(target: &str) -> (String, Option<u32>) {
    let target = target.trim_start_matches('=');
    match target.split_once(':') {
        Some((session, slot)) => (session.to_string(), slot.parse().ok()),
        None => (target.to_string(), None),
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::with_version("tmux 3.4")
    }

    pub fn with_version(version: &str) -> Self {
        Self {
            version: version.to_string(),
            sessions: RefCell::new(BTreeMap::new()),
            exits_on_start: RefCell::new(Vec::new()),
            captures: RefCell::new(VecDeque::new()),
            capture_calls: Cell::new(0),
            keys: RefCell::new(Vec::new()),
            killed_pids: RefCell::new(Vec::new()),
            failing_pids: RefCell::new(HashSet::new()),
            attached: RefCell::new(Vec::new()),
            next_pid: Cell::new(1000),
        }
    }

    fn alloc_pid(&self) -> u32 {
        let pid = self.next_pid.get();
        self.next_pid.set(pid + 1);
        pid
    }

    /// A session holding only its control shell.
    pub fn with_group(name: &str) -> Self {
        let backend = Self::new();
        backend
            .new_session(name)
            .expect("fresh fake session");
        backend
    }

    /// Inserts a window directly, bypassing the launcher. It keeps its pane
    /// on exit like every window pgm creates.
    pub fn insert_window(&self, session: &str, slot: u32, name: &str, command: &str, dead: bool) {
        let pid = self.alloc_pid();
        let mut sessions = self.sessions.borrow_mut();
        let windows = sessions.entry(session.to_string()).or_default();
        windows.insert(
            slot,
            FakeWindow {
                name: name.to_string(),
                pid,
                dead,
                exit_code: if dead { Some(0) } else { None },
                command: Some(command.to_string()),
                options: BTreeMap::from([(REMAIN_ON_EXIT.to_string(), "on".to_string())]),
                ..FakeWindow::default()
            },
        );
    }

    /// Makes `command` exit with `code` as soon as a pane starts it.
    pub fn script_exit(&self, command: &str, code: i32) {
        self.exits_on_start
            .borrow_mut()
            .push((command.to_string(), code));
    }

    /// Blanks the window's pane pid, as tmux does while a pane starts.
    pub fn clear_pid(&self, session: &str, slot: u32) {
        if let Some(w) = self
            .sessions
            .borrow_mut()
            .get_mut(session)
            .and_then(|ws| ws.get_mut(&slot))
        {
            w.pid = 0;
        }
    }

    /// The process in `session:slot` exits. Without `remain-on-exit` the
    /// window goes away with it.
    fn exit_process(&self, session: &str, slot: u32, code: Option<i32>) {
        let mut sessions = self.sessions.borrow_mut();
        let Some(windows) = sessions.get_mut(session) else {
            return;
        };
        let keep = match windows.get_mut(&slot) {
            Some(w) => {
                w.dead = true;
                w.exit_code = code;
                w.options.get(REMAIN_ON_EXIT).is_some_and(|v| v == "on")
            }
            None => return,
        };
        if !keep {
            windows.remove(&slot);
        }
    }

    pub fn window(&self, session: &str, slot: u32) -> Option<FakeWindow> {
        self.sessions
            .borrow()
            .get(session)
            .and_then(|ws| ws.get(&slot))
            .cloned()
    }

    pub fn slots(&self, session: &str) -> Vec<u32> {
        self.sessions
            .borrow()
            .get(session)
            .map(|ws| ws.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn session_names(&self) -> Vec<String> {
        self.sessions.borrow().keys().cloned().collect()
    }

    /// Queues the text returned by successive `capture_pane` calls.
    pub fn script_captures<I: IntoIterator<Item = S>, S: Into<String>>(&self, outputs: I) {
        self.captures
            .borrow_mut()
            .extend(outputs.into_iter().map(Into::into));
    }

    pub fn capture_calls(&self) -> usize {
        self.capture_calls.get()
    }

    /// Every `send_keys` call as `(target, keys, literal)`.
    pub fn sent_keys(&self) -> Vec<(String, String, bool)> {
        self.keys.borrow().clone()
    }

    pub fn killed_pids(&self) -> Vec<u32> {
        self.killed_pids.borrow().clone()
    }

    pub fn fail_signals_for(&self, pid: u32) {
        self.failing_pids.borrow_mut().insert(pid);
    }

    pub fn attached(&self) -> Vec<String> {
        self.attached.borrow().clone()
    }

    fn render(slot: u32, w: &FakeWindow) -> String {
        let opt = |key: &str| w.options.get(key).cloned().unwrap_or_default();
        let command = w
            .options
            .get(OPT_COMMAND)
            .cloned()
            .or_else(|| w.command.clone())
            .unwrap_or_default();
        let pid = if w.pid == 0 {
            String::new()
        } else {
            w.pid.to_string()
        };
        [
            slot.to_string(),
            w.name.clone(),
            pid,
            if w.dead { "1" } else { "0" }.to_string(),
            w.exit_code.map(|c| c.to_string()).unwrap_or_default(),
            opt(OPT_MODE),
            opt(OPT_SUDO),
            opt(OPT_DIR),
            if w.options.contains_key(OPT_COMMAND) { "1" } else { "0" }.to_string(),
            command,
        ]
        .join(FIELD_DELIMITER)
    }
}

impl Multiplexer for FakeBackend {
    fn version(&self) -> Result<String> {
        Ok(self.version.clone())
    }

    fn has_session(&self, session: &str) -> Result<bool> {
        Ok(self.sessions.borrow().contains_key(session))
    }

    fn new_session(&self, session: &str) -> Result<()> {
        if self.has_session(session)? {
            return Err(backend_error("new-session", "duplicate session"));
        }
        let pid = self.alloc_pid();
        let mut windows = BTreeMap::new();
        windows.insert(
            0,
            FakeWindow {
                name: "control".to_string(),
                pid,
                ..FakeWindow::default()
            },
        );
        self.sessions
            .borrow_mut()
            .insert(session.to_string(), windows);
        Ok(())
    }

    fn kill_session(&self, session: &str) -> Result<()> {
        self.sessions
            .borrow_mut()
            .remove(session)
            .map(drop)
            .ok_or_else(|| backend_error("kill-session", "can't find session"))
    }

    fn list_sessions(&self) -> Result<Vec<String>> {
        Ok(self.session_names())
    }

    fn new_window(&self, session: &str, slot: u32, name: &str) -> Result<()> {
        let pid = self.alloc_pid();
        let mut sessions = self.sessions.borrow_mut();
        let windows = sessions
            .get_mut(session)
            .ok_or_else(|| backend_error("new-window", "can't find session"))?;
        if windows.contains_key(&slot) {
            return Err(backend_error("new-window", "index in use"));
        }
        windows.insert(
            slot,
            FakeWindow {
                name: name.to_string(),
                pid,
                cwd: std::env::current_dir().ok(),
                ..FakeWindow::default()
            },
        );
        Ok(())
    }

    fn respawn_pane(&self, target: &str, command: &str) -> Result<()> {
        let (session, slot) = parse_target(target);
        let slot = slot.ok_or_else(|| backend_error("respawn-pane", "can't find window"))?;
        let pid = self.alloc_pid();
        {
            let mut sessions = self.sessions.borrow_mut();
            let window = sessions
                .get_mut(&session)
                .and_then(|ws| ws.get_mut(&slot))
                .ok_or_else(|| backend_error("respawn-pane", "can't find window"))?;
            window.pid = pid;
            window.dead = false;
            window.exit_code = None;
            window.command = Some(command.to_string());
        }

        let exit = self
            .exits_on_start
            .borrow()
            .iter()
            .find(|(c, _)| c == command)
            .map(|(_, code)| *code);
        if let Some(code) = exit {
            self.exit_process(&session, slot, Some(code));
        }
        Ok(())
    }

    fn list_windows(&self, session: &str, _format: &str) -> Result<Vec<String>> {
        let sessions = self.sessions.borrow();
        let windows = sessions
            .get(session)
            .ok_or_else(|| backend_error("list-windows", "can't find session"))?;
        Ok(windows
            .iter()
            .map(|(slot, w)| Self::render(*slot, w))
            .collect())
    }

    fn kill_window(&self, target: &str) -> Result<()> {
        let (session, slot) = parse_target(target);
        let mut sessions = self.sessions.borrow_mut();
        slot.and_then(|s| sessions.get_mut(&session)?.remove(&s))
            .map(drop)
            .ok_or_else(|| backend_error("kill-window", "can't find window"))
    }

    fn set_window_option(&self, target: &str, option: &str, value: &str) -> Result<()> {
        let (session, slot) = parse_target(target);
        let mut sessions = self.sessions.borrow_mut();
        let window = slot
            .and_then(|s| sessions.get_mut(&session)?.get_mut(&s))
            .ok_or_else(|| backend_error("set-window-option", "can't find window"))?;
        window.options.insert(option.to_string(), value.to_string());
        Ok(())
    }

    fn select_window(&self, target: &str) -> Result<()> {
        let (session, slot) = parse_target(target);
        let sessions = self.sessions.borrow();
        slot.and_then(|s| sessions.get(&session)?.get(&s))
            .map(drop)
            .ok_or_else(|| backend_error("select-window", "can't find window"))
    }

    fn capture_pane(&self, _target: &str, _history: bool) -> Result<String> {
        self.capture_calls.set(self.capture_calls.get() + 1);
        Ok(self.captures.borrow_mut().pop_front().unwrap_or_default())
    }

    fn send_keys(&self, target: &str, keys: &str, literal: bool) -> Result<()> {
        self.keys
            .borrow_mut()
            .push((target.to_string(), keys.to_string(), literal));
        Ok(())
    }

    fn new_grouped_session(&self, session: &str, group: &str) -> Result<()> {
        let mut sessions = self.sessions.borrow_mut();
        let windows = sessions
            .get(group)
            .cloned()
            .ok_or_else(|| backend_error("new-session", "can't find session"))?;
        sessions.insert(session.to_string(), windows);
        Ok(())
    }

    fn attach(&self, session: &str) -> Result<()> {
        self.attached.borrow_mut().push(session.to_string());
        Ok(())
    }

    fn signal_pid(&self, pid: u32) -> Result<()> {
        if pid == 0 {
            return Err(backend_error("kill -KILL", "invalid process id"));
        }
        if self.failing_pids.borrow().contains(&pid) {
            return Err(backend_error("kill -KILL", "Operation not permitted"));
        }
        self.killed_pids.borrow_mut().push(pid);
        let hit: Vec<(String, u32)> = self
            .sessions
            .borrow()
            .iter()
            .flat_map(|(session, windows)| {
                windows
                    .iter()
                    .filter(|(_, w)| w.pid == pid)
                    .map(move |(slot, _)| (session.clone(), *slot))
            })
            .collect();
        for (session, slot) in hit {
            self.exit_process(&session, slot, None);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_without_remain_on_exit_vanishes() {
        let tmux = FakeBackend::with_group("g");
        tmux.new_window("g", 1, "quick").unwrap();
        tmux.script_exit("false", 1);

        tmux.respawn_pane("=g:1", "false").unwrap();
        assert_eq!(tmux.slots("g"), [0]);
    }

    #[test]
    fn test_window_with_remain_on_exit_stays_dead() {
        let tmux = FakeBackend::with_group("g");
        tmux.new_window("g", 1, "quick").unwrap();
        tmux.set_window_option("=g:1", REMAIN_ON_EXIT, "on").unwrap();
        tmux.script_exit("false", 1);

        tmux.respawn_pane("=g:1", "false").unwrap();
        let window = tmux.window("g", 1).unwrap();
        assert!(window.dead);
        assert_eq!(window.exit_code, Some(1));
    }
}
