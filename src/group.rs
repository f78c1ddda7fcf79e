//! Group registry: one backend session per group.

use crate::backend::Multiplexer;
use crate::connector::EPHEMERAL_PREFIX;
use crate::error::{PgmError, Result};
use crate::process::{validate_name, Inspector};
use tracing::info;

/// Name plus process counts, for the `groups` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub name: String,
    pub processes: usize,
    pub running: usize,
}

pub struct GroupRegistry<'a> {
    tmux: &'a dyn Multiplexer,
}

impl<'a> GroupRegistry<'a> {
    pub fn new(tmux: &'a dyn Multiplexer) -> Self {
        Self { tmux }
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        self.tmux.has_session(name)
    }

    /// Fail with `GroupNotFound` unless the group is active.
    pub fn require_active(&self, name: &str) -> Result<()> {
        if self.exists(name)? {
            Ok(())
        } else {
            Err(PgmError::GroupNotFound(name.to_string()))
        }
    }

    /// Group names in backend order. Connector sessions are not groups.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .tmux
            .list_sessions()?
            .into_iter()
            .filter(|s| !s.starts_with(EPHEMERAL_PREFIX))
            .collect())
    }

    pub fn summaries(&self) -> Result<Vec<GroupSummary>> {
        let inspector = Inspector::new(self.tmux);
        self.list()?
            .into_iter()
            .map(|name| {
                let processes = inspector.list_processes(&name)?;
                Ok(GroupSummary {
                    running: processes.iter().filter(|p| p.is_running()).count(),
                    processes: processes.len(),
                    name,
                })
            })
            .collect()
    }

    pub fn create(&self, name: &str) -> Result<()> {
        validate_name("group", name)?;
        if name.starts_with(EPHEMERAL_PREFIX) {
            return Err(PgmError::validation(format!(
                "group names may not start with '{EPHEMERAL_PREFIX}'"
            )));
        }
        if self.exists(name)? {
            return Err(PgmError::conflict(format!("group '{name}' already exists")));
        }

        // remain-on-exit is a window option, so the launcher sets it per window
        self.tmux.new_session(name)?;
        info!(group = name, "group created");
        Ok(())
    }

    /// Destroy the group. Without `force`, refuses while anything still runs.
    pub fn destroy(&self, name: &str, force: bool) -> Result<()> {
        self.require_active(name)?;

        if !force {
            let running: Vec<String> = Inspector::new(self.tmux)
                .list_processes(name)?
                .into_iter()
                .filter(|p| p.is_running())
                .map(|p| p.name)
                .collect();
            if !running.is_empty() {
                return Err(PgmError::conflict(format!(
                    "group '{name}' has processes running ({}); stop them or use --force",
                    running.join(", ")
                )));
            }
        }

        self.tmux.kill_session(name)?;
        info!(group = name, force, "group destroyed");
        Ok(())
    }
}
