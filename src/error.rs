use thiserror::Error;

/// Broad classification of a [`PgmError`], used for exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    StateConflict,
    Credential,
    Backend,
    Environment,
}

/// All errors produced by pgm.
#[derive(Error, Debug)]
pub enum PgmError {
    /// Bad input: names, duplicate processes, malformed definition files.
    #[error("{0}")]
    Validation(String),

    #[error("group '{0}' does not exist")]
    GroupNotFound(String),

    #[error("process '{name}' not found in group '{group}'{}", suggestion_hint(.suggestion))]
    ProcessNotFound {
        group: String,
        name: String,
        suggestion: Option<String>,
    },

    /// The operation is not allowed in the current run state.
    #[error("{0}")]
    StateConflict(String),

    #[error("credential error: {0}")]
    Credential(String),

    /// A backend call exited unsuccessfully.
    #[error("`{command}` failed: {stderr}")]
    Backend { command: String, stderr: String },

    /// Backend missing, too old, or otherwise unusable.
    #[error("{0}")]
    Environment(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// At least one item of an "all" operation failed.
    #[error("{operation}: {} item(s) failed ({})", .failed.len(), .failed.join(", "))]
    Bulk {
        operation: String,
        failed: Vec<String>,
    },
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{s}'?)"),
        None => String::new(),
    }
}

impl PgmError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }

    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::GroupNotFound(_) | Self::ProcessNotFound { .. } => ErrorKind::NotFound,
            Self::StateConflict(_) | Self::Bulk { .. } => ErrorKind::StateConflict,
            Self::Credential(_) => ErrorKind::Credential,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::Environment(_) | Self::Io(_) => ErrorKind::Environment,
        }
    }

    /// Process exit code: 2 for missing groups/processes, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::NotFound => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, PgmError>;
