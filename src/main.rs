use anyhow::Context;
use clap::Parser;
use pgm::cli::{parse_exit_code, Cli};
use pgm::commands::Dispatcher;
use pgm::credential::SystemClock;
use pgm::{Settings, Tmux};
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `PGM_LOG` wins, then `-v`, then the configured level.
fn init_logging(settings: &Settings, verbose: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_env("PGM_LOG") {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("pgm=debug"),
        Err(_) => EnvFilter::try_new(&settings.log_level)
            .with_context(|| format!("invalid log_level '{}'", settings.log_level))?,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("failed to install log subscriber")
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_exit_code(&e));
        }
    };
    let settings = Settings::load();

    if let Err(e) = init_logging(&settings, cli.verbose) {
        eprintln!("Warning: {e:#}");
    }

    let tmux = Tmux::new(
        cli.tmux.clone().unwrap_or_else(|| settings.tmux.clone()),
        cli.socket.clone().or_else(|| settings.socket.clone()),
    );

    match Dispatcher::new(&tmux, &SystemClock).run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
