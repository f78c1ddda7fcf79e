//! Process state inspection: parses the backend's window listing into processes.
//!
//! Nothing is cached. Every call asks the backend, so two listings with no
//! mutation in between are identical, and every check made by the launcher
//! or the lifecycle controller sees the live state.

use super::{ExecMode, Privilege, Process, RunStatus, CONTROL_SLOT};
use crate::backend::{window_target, Multiplexer};
use crate::error::{PgmError, Result};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::path::PathBuf;

/// Separates listing fields. Names are validated and the other fields are
/// numeric or fixed words, so only the command (always last) could contain it.
pub const FIELD_DELIMITER: &str = "<|>";

pub const OPT_COMMAND: &str = "@pgm_cmd";
pub const OPT_MODE: &str = "@pgm_mode";
pub const OPT_SUDO: &str = "@pgm_sudo";
pub const OPT_DIR: &str = "@pgm_dir";

const FIELD_COUNT: usize = 10;

/// `list-windows -F` format producing one [`WindowRecord`] per line.
pub fn window_format() -> String {
    [
        "#{window_index}".to_string(),
        "#{window_name}".to_string(),
        "#{pane_pid}".to_string(),
        "#{pane_dead}".to_string(),
        "#{pane_dead_status}".to_string(),
        format!("#{{{OPT_MODE}}}"),
        format!("#{{{OPT_SUDO}}}"),
        format!("#{{{OPT_DIR}}}"),
        format!("#{{?{OPT_COMMAND},1,0}}"),
        format!("#{{?{OPT_COMMAND},#{{{OPT_COMMAND}}},#{{pane_start_command}}}}"),
    ]
    .join(FIELD_DELIMITER)
}

/// One window as reported by the backend, control shell included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRecord {
    pub slot: u32,
    pub name: String,
    /// `None` while the pane is still starting up.
    pub pid: Option<u32>,
    pub dead: bool,
    pub exit_code: Option<i32>,
    pub mode: ExecMode,
    pub privilege: Privilege,
    pub workdir: Option<PathBuf>,
    pub command: String,
}

impl WindowRecord {
    pub fn status(&self) -> RunStatus {
        if self.dead {
            RunStatus::Exited(self.exit_code)
        } else {
            RunStatus::Running
        }
    }

    pub fn into_process(self) -> Process {
        let status = self.status();
        Process {
            name: self.name,
            slot: self.slot,
            command: self.command,
            mode: self.mode,
            privilege: self.privilege,
            workdir: self.workdir,
            status,
            pid: self.pid,
        }
    }
}

fn malformed(line: &str, what: &str) -> PgmError {
    PgmError::Backend {
        command: "list-windows".to_string(),
        stderr: format!("unexpected output ({what}): {line:?}"),
    }
}

/// Tmux quotes start commands containing spaces. Only applies to the
/// start command fallback; recorded commands are kept verbatim.
fn unquote(command: &str) -> &str {
    command
        .strip_prefix('"')
        .and_then(|c| c.strip_suffix('"'))
        .unwrap_or(command)
}

/// Parse one line produced by [`window_format`].
pub fn parse_window_line(line: &str) -> Result<WindowRecord> {
    let fields: Vec<&str> = line.splitn(FIELD_COUNT, FIELD_DELIMITER).collect();
    if fields.len() != FIELD_COUNT {
        return Err(malformed(line, "field count"));
    }

    let slot = fields[0]
        .parse()
        .map_err(|_| malformed(line, "window index"))?;
    let pid = if fields[2].is_empty() {
        None
    } else {
        let pid: u32 = fields[2].parse().map_err(|_| malformed(line, "pid"))?;
        Some(pid).filter(|p| *p != 0)
    };
    let dead = fields[3] == "1";
    let exit_code = fields[4].parse().ok();

    let mode = match fields[5] {
        "shell" => ExecMode::Shell,
        _ => ExecMode::Exec,
    };
    let privilege = if fields[6] == "1" {
        Privilege::Sudo
    } else {
        Privilege::Normal
    };
    let workdir = Some(fields[7])
        .filter(|d| !d.is_empty())
        .map(PathBuf::from);

    Ok(WindowRecord {
        slot,
        name: fields[1].to_string(),
        pid,
        dead,
        exit_code,
        mode,
        privilege,
        workdir,
        command: if fields[8] == "1" {
            fields[9].to_string()
        } else {
            unquote(fields[9]).to_string()
        },
    })
}

/// Pick the live process name closest to a mistyped one.
fn suggest<'p>(name: &str, processes: &'p [Process]) -> Option<&'p str> {
    let matcher = SkimMatcherV2::default();
    processes
        .iter()
        .filter_map(|p| {
            let forward = matcher.fuzzy_match(&p.name, name);
            let backward = matcher.fuzzy_match(name, &p.name);
            forward.max(backward).map(|score| (p.name.as_str(), score))
        })
        .max_by_key(|(_, score)| *score)
        .map(|(n, _)| n)
}

/// Read-only view of a group's processes.
pub struct Inspector<'a> {
    tmux: &'a dyn Multiplexer,
}

impl<'a> Inspector<'a> {
    pub fn new(tmux: &'a dyn Multiplexer) -> Self {
        Self { tmux }
    }

    /// Every window of the group, including the control shell.
    pub fn windows(&self, group: &str) -> Result<Vec<WindowRecord>> {
        if !self.tmux.has_session(group)? {
            return Err(PgmError::GroupNotFound(group.to_string()));
        }
        self.tmux
            .list_windows(group, &window_format())?
            .iter()
            .map(|line| parse_window_line(line))
            .collect()
    }

    /// Processes of the group in slot order, control shell excluded.
    pub fn list_processes(&self, group: &str) -> Result<Vec<Process>> {
        Ok(self
            .windows(group)?
            .into_iter()
            .filter(|w| w.slot != CONTROL_SLOT)
            .map(WindowRecord::into_process)
            .collect())
    }

    /// Sorted window indices currently in use, control shell included.
    pub fn used_slots(&self, group: &str) -> Result<Vec<u32>> {
        let mut slots: Vec<u32> = self.windows(group)?.iter().map(|w| w.slot).collect();
        slots.sort_unstable();
        Ok(slots)
    }

    /// Look up one process by name.
    pub fn find(&self, group: &str, name: &str) -> Result<Process> {
        let processes = self.list_processes(group)?;
        if let Some(p) = processes.iter().find(|p| p.name == name) {
            return Ok(p.clone());
        }
        Err(PgmError::ProcessNotFound {
            group: group.to_string(),
            name: name.to_string(),
            suggestion: suggest(name, &processes).map(str::to_string),
        })
    }

    /// The last `lines` lines of a process's output, scrollback included.
    pub fn tail(&self, group: &str, name: &str, lines: usize) -> Result<Vec<String>> {
        let process = self.find(group, name)?;
        let text = self
            .tmux
            .capture_pane(&window_target(group, process.slot), true)?;

        let mut all: Vec<&str> = text.lines().collect();
        while all.last().is_some_and(|l| l.trim().is_empty()) {
            all.pop();
        }
        let start = all.len().saturating_sub(lines);
        Ok(all[start..].iter().map(|l| l.to_string()).collect())
    }
}
