//! Process definition files: one TOML table per process.
//!
//! ```toml
//! [web]
//! cmd = "python -m http.server 8080"
//! dir = "~/srv/site"
//!
//! [tunnel]
//! cmd = "ssh -N -L 5432:db:5432 bastion"
//! enabled = false
//! ```
//!
//! | key       | default | meaning                                   |
//! |-----------|---------|-------------------------------------------|
//! | `cmd`     | none    | command to run (required)                 |
//! | `enabled` | `true`  | disabled sections are parsed but skipped  |
//! | `sudo`    | `false` | run with elevated privilege               |
//! | `shell`   | `false` | type the command into an interactive shell |
//! | `dir`     | none    | working directory, `~` expanded           |

use super::expand_tilde;
use crate::error::{PgmError, Result};
use crate::process::{validate_name, ExecMode, LaunchRequest, Privilege};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDefinition {
    pub name: String,
    pub command: String,
    pub enabled: bool,
    pub sudo: bool,
    pub shell: bool,
    pub workdir: Option<PathBuf>,
}

impl ProcessDefinition {
    pub fn to_request(&self) -> LaunchRequest {
        LaunchRequest {
            name: self.name.clone(),
            command: self.command.clone(),
            mode: if self.shell {
                ExecMode::Shell
            } else {
                ExecMode::Exec
            },
            privilege: if self.sudo {
                Privilege::Sudo
            } else {
                Privilege::Normal
            },
            workdir: self.workdir.clone(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Section {
    cmd: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    sudo: bool,
    #[serde(default)]
    shell: bool,
    dir: Option<String>,
}

/// Section name from toml's "duplicate key `name` ..." message.
fn duplicate_section(message: &str) -> Option<&str> {
    const MARKER: &str = "duplicate key `";
    let rest = &message[message.find(MARKER)? + MARKER.len()..];
    rest.split('`').next().map(|k| k.trim_matches('"'))
}

fn parse_error(e: toml::de::Error) -> PgmError {
    match duplicate_section(e.message()) {
        Some(name) => PgmError::validation(format!("duplicate process section '{name}'")),
        None => PgmError::validation(format!("invalid definition file: {e}")),
    }
}

/// All sections of one definition file, disabled ones included.
#[derive(Debug, Clone)]
pub struct ProcessFile {
    definitions: Vec<ProcessDefinition>,
}

impl ProcessFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PgmError::validation(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&content).map_err(|e| match e {
            PgmError::Validation(msg) => {
                PgmError::validation(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content).map_err(parse_error)?;

        let mut definitions = Vec::with_capacity(table.len());
        for (name, value) in table {
            if !value.is_table() {
                return Err(PgmError::validation(format!(
                    "top-level key '{name}' is not a process section"
                )));
            }
            validate_name("process", &name)?;

            let section = value
                .try_into::<Section>()
                .map_err(|e| PgmError::validation(format!("section '{name}': {e}")))?;
            let command = match section.cmd {
                Some(cmd) if !cmd.trim().is_empty() => cmd,
                _ => {
                    return Err(PgmError::validation(format!(
                        "section '{name}' is missing required key 'cmd'"
                    )))
                }
            };

            definitions.push(ProcessDefinition {
                name,
                command,
                enabled: section.enabled,
                sudo: section.sudo,
                shell: section.shell,
                workdir: section.dir.as_deref().map(expand_tilde),
            });
        }

        Ok(Self { definitions })
    }

    /// Definitions that should be launched, in file order.
    pub fn enabled(&self) -> impl Iterator<Item = &ProcessDefinition> {
        self.definitions.iter().filter(|d| d.enabled)
    }

    /// Sections marked `enabled = false`.
    pub fn skipped(&self) -> impl Iterator<Item = &ProcessDefinition> {
        self.definitions.iter().filter(|d| !d.enabled)
    }

    pub fn find(&self, name: &str) -> Option<&ProcessDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }
}
