use crate::process::{StopSignal, Target};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pgm", version)]
#[command(about = "Run named process groups inside tmux", long_about = None)]
pub struct Cli {
    /// Log backend calls and lifecycle decisions
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// tmux binary to use
    #[arg(long, global = true)]
    pub tmux: Option<String>,

    /// tmux server socket name
    #[arg(short = 'L', long, global = true)]
    pub socket: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a group, optionally starting processes from a definition file
    Init {
        group: String,
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List groups
    Groups,

    /// List the processes of a group
    List {
        group: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Start a process in a group
    Add {
        group: String,
        name: String,
        /// Command to run; consumes the rest of the line
        #[arg(
            long,
            num_args = 1..,
            allow_hyphen_values = true,
            required_unless_present = "config",
            conflicts_with = "config"
        )]
        cmd: Vec<String>,
        /// Take the command from the section called NAME in this file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Run with sudo; the password is asked for twice
        #[arg(long)]
        sudo: bool,
        /// Working directory
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Type the command into a shell so pipes and redirects work
        #[arg(long)]
        shell: bool,
        /// Attach to the process once it is started
        #[arg(long)]
        connect: bool,
    },

    /// Attach to a process
    Connect { group: String, name: String },

    /// Print the recent output of a process
    Tail {
        group: String,
        name: String,
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,
    },

    /// Signal processes (Ctrl-C unless another signal is chosen)
    Stop {
        group: String,
        #[command(flatten)]
        target: TargetArgs,
        /// Remove each process once it has been signalled
        #[arg(short = 'r', long = "rm")]
        remove: bool,
        #[command(flatten)]
        signal: SignalArgs,
    },

    /// Remove exited processes
    Rm {
        group: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Destroy a group
    Destroy {
        group: String,
        /// Destroy even if processes are still running
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct TargetArgs {
    /// A single process
    #[arg(long)]
    pub name: Option<String>,
    /// Every process in the group
    #[arg(long)]
    pub all: bool,
}

impl TargetArgs {
    pub fn target(&self) -> Target {
        match &self.name {
            Some(name) if !self.all => Target::Name(name.clone()),
            _ => Target::All,
        }
    }
}

#[derive(Args, Debug, Default)]
#[group(multiple = false)]
pub struct SignalArgs {
    /// Send Ctrl-D
    #[arg(short = 'd', long)]
    pub eof: bool,
    /// Send Ctrl-\
    #[arg(short = 'q', long)]
    pub quit: bool,
    /// Send SIGKILL
    #[arg(short = '9', long)]
    pub kill: bool,
}

impl SignalArgs {
    pub fn signal(&self) -> StopSignal {
        if self.kill {
            StopSignal::ForceKill
        } else if self.quit {
            StopSignal::Quit
        } else if self.eof {
            StopSignal::Eof
        } else {
            StopSignal::Interrupt
        }
    }
}

/// Exit status for a failed parse: usage errors count as validation
/// failures, while `--help` and `--version` succeed.
pub fn parse_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}
