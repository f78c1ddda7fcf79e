//! pgm library - named process groups on top of tmux

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod connector;
pub mod credential;
pub mod error;
pub mod group;
pub mod process;

// Re-export commonly used types
pub use backend::{Multiplexer, Tmux};
pub use config::{ProcessDefinition, ProcessFile, Settings};
pub use error::{ErrorKind, PgmError, Result};
pub use group::GroupRegistry;
pub use process::{Inspector, LaunchRequest, Launcher, Lifecycle, Process};
