//! Interactive attachment through short-lived grouped sessions.

use crate::backend::{window_target, Multiplexer};
use crate::error::Result;
use crate::group::GroupRegistry;
use crate::process::Inspector;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix of connector sessions; they are never listed as groups.
pub const EPHEMERAL_PREFIX: &str = "pgm-connect-";

fn ephemeral_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{EPHEMERAL_PREFIX}{}", &id[..8])
}

pub struct Connector<'a> {
    tmux: &'a dyn Multiplexer,
}

impl<'a> Connector<'a> {
    pub fn new(tmux: &'a dyn Multiplexer) -> Self {
        Self { tmux }
    }

    /// Attach to a whole group, or to one process when `name` is given.
    ///
    /// The bridging session shares the group's windows, so slots and names
    /// are the same as in `list`. It is destroyed once the operator detaches.
    pub fn attach(&self, group: &str, name: Option<&str>) -> Result<()> {
        GroupRegistry::new(self.tmux).require_active(group)?;
        let slot = match name {
            Some(name) => Some(Inspector::new(self.tmux).find(group, name)?.slot),
            None => None,
        };

        let session = ephemeral_name();
        self.tmux.new_grouped_session(&session, group)?;
        debug!(session, group, "bridging session created");

        let attached = match slot {
            Some(slot) => self
                .tmux
                .select_window(&window_target(&session, slot))
                .and_then(|()| self.tmux.attach(&session)),
            None => self.tmux.attach(&session),
        };

        if self.tmux.has_session(&session)? {
            if let Err(e) = self.tmux.kill_session(&session) {
                warn!(session, error = %e, "could not remove bridging session");
            }
        }
        attached
    }
}
