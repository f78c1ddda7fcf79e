//! Operator settings and process definition files

pub mod definitions;

pub use definitions::{ProcessDefinition, ProcessFile};

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backend binary
    pub tmux: String,
    /// Backend socket name (`tmux -L`)
    pub socket: Option<String>,
    /// Default tracing filter directive
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tmux: "tmux".to_string(),
            socket: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Self {
        let paths = [
            dirs::config_dir().map(|p| p.join("pgm/config.toml")),
            dirs::home_dir().map(|p| p.join(".pgm.toml")),
            Some(PathBuf::from("pgm.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            match std::fs::read_to_string(&path).map(|c| toml::from_str(&c)) {
                Ok(Ok(settings)) => return settings,
                Ok(Err(e)) => eprintln!("Warning: ignoring {}: {e}", path.display()),
                Err(e) => eprintln!("Warning: cannot read {}: {e}", path.display()),
            }
        }

        Settings::default()
    }
}

/// Expand ~ to home directory in paths
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
