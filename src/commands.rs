//! Command dispatch: one function per subcommand, printing results.

use crate::backend::{check_version, Multiplexer};
use crate::cli::Commands;
use crate::config::ProcessFile;
use crate::connector::Connector;
use crate::credential::{prompt_confirmed, Clock};
use crate::error::{ErrorKind, PgmError, Result};
use crate::group::{GroupRegistry, GroupSummary};
use crate::process::{
    BulkOutcome, ExecMode, Inspector, LaunchRequest, Launched, Launcher, Lifecycle, Privilege,
    Process, StopSignal, Target,
};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct Dispatcher<'a> {
    tmux: &'a dyn Multiplexer,
    clock: &'a dyn Clock,
}

impl<'a> Dispatcher<'a> {
    pub fn new(tmux: &'a dyn Multiplexer, clock: &'a dyn Clock) -> Self {
        Self { tmux, clock }
    }

    pub fn run(&self, command: Commands) -> Result<()> {
        check_version(self.tmux)?;
        debug!(?command, "dispatching");

        match command {
            Commands::Init { group, config } => self.init(&group, config.as_deref()),
            Commands::Groups => {
                print!("{}", render_groups(&GroupRegistry::new(self.tmux).summaries()?));
                Ok(())
            }
            Commands::List { group, json } => self.list(&group, json),
            Commands::Add {
                group,
                name,
                cmd,
                config,
                sudo,
                dir,
                shell,
                connect,
            } => {
                let request = match config {
                    Some(path) => match request_from_file(&path, &name)? {
                        Some(request) => request,
                        None => {
                            eprintln!("Skipping '{name}': disabled in {}", path.display());
                            return Ok(());
                        }
                    },
                    None => LaunchRequest::new(name, cmd.join(" ")),
                };
                let request = apply_overrides(request, sudo, shell, dir);
                let launched = self.add(&group, &request)?;
                if connect {
                    Connector::new(self.tmux).attach(&group, Some(&launched.name))?;
                }
                Ok(())
            }
            Commands::Connect { group, name } => {
                Connector::new(self.tmux).attach(&group, Some(&name))
            }
            Commands::Tail { group, name, lines } => {
                for line in Inspector::new(self.tmux).tail(&group, &name, lines)? {
                    println!("{line}");
                }
                Ok(())
            }
            Commands::Stop {
                group,
                target,
                remove,
                signal,
            } => self.stop(&group, &target.target(), remove, signal.signal()),
            Commands::Rm { group, target } => {
                let outcome = Lifecycle::new(self.tmux).remove_target(&group, &target.target())?;
                report(outcome, "remove", "still running")
            }
            Commands::Destroy { group, force } => {
                GroupRegistry::new(self.tmux).destroy(&group, force)?;
                println!("Destroyed group '{group}'");
                Ok(())
            }
        }
    }

    /// Create the group, then start every enabled definition of `config`.
    /// The file is read first so a bad file leaves nothing behind.
    fn init(&self, group: &str, config: Option<&Path>) -> Result<()> {
        let file = config.map(ProcessFile::load).transpose()?;
        let registry = GroupRegistry::new(self.tmux);
        registry.create(group)?;
        println!("Created group '{group}'");

        let Some(file) = file else {
            return Ok(());
        };
        for skipped in file.skipped() {
            eprintln!("Skipping '{}': disabled", skipped.name);
        }

        let mut outcome = BulkOutcome::default();
        for definition in file.enabled() {
            match self.add(group, &definition.to_request()) {
                Ok(launched) => outcome.succeeded.push(launched.name),
                Err(e) => outcome.failed.push((definition.name.clone(), e)),
            }
        }
        report(outcome, "init", "")
    }

    fn list(&self, group: &str, json: bool) -> Result<()> {
        let processes = Inspector::new(self.tmux).list_processes(group)?;
        if json {
            let text = serde_json::to_string_pretty(&processes)
                .map_err(|e| PgmError::Environment(format!("cannot encode listing: {e}")))?;
            println!("{text}");
        } else {
            print!("{}", render_processes(&processes));
        }
        Ok(())
    }

    /// Launch one process, asking for the sudo password first when needed.
    fn add(&self, group: &str, request: &LaunchRequest) -> Result<Launched> {
        // Fail before the password prompt rather than after it
        GroupRegistry::new(self.tmux).require_active(group)?;
        match Inspector::new(self.tmux).find(group, &request.name) {
            Ok(_) => {
                return Err(PgmError::validation(format!(
                    "process '{}' already exists in group '{group}'",
                    request.name
                )))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let launcher = Launcher::new(self.tmux, self.clock);
        let credential = if launcher.needs_credential(request) {
            Some(prompt_confirmed(&request.name)?)
        } else {
            None
        };
        let launched = launcher.launch(group, request, credential)?;
        println!("Started '{}' in slot {}", launched.name, launched.slot);
        Ok(launched)
    }

    fn stop(&self, group: &str, target: &Target, remove: bool, signal: StopSignal) -> Result<()> {
        let lifecycle = Lifecycle::new(self.tmux);
        if remove {
            report(
                lifecycle.stop_and_remove(group, target, signal)?,
                "stop and remove",
                "already exited",
            )
        } else {
            report(
                lifecycle.stop_target(group, target, signal)?,
                "stop",
                "already exited",
            )
        }
    }
}

/// Look up `name` in a definition file. `None` when the section is disabled.
fn request_from_file(path: &Path, name: &str) -> Result<Option<LaunchRequest>> {
    let file = ProcessFile::load(path)?;
    let definition = file.find(name).ok_or_else(|| {
        PgmError::validation(format!("no section '{name}' in {}", path.display()))
    })?;
    Ok(definition.enabled.then(|| definition.to_request()))
}

/// Command-line flags win over definition file values.
fn apply_overrides(
    mut request: LaunchRequest,
    sudo: bool,
    shell: bool,
    dir: Option<PathBuf>,
) -> LaunchRequest {
    if sudo {
        request.privilege = Privilege::Sudo;
    }
    if shell {
        request.mode = ExecMode::Shell;
    }
    if dir.is_some() {
        request.workdir = dir;
    }
    request
}

/// Print skips and failures of a bulk operation, then fold it into a result.
fn report(outcome: BulkOutcome, operation: &str, skip_reason: &str) -> Result<()> {
    for name in &outcome.succeeded {
        debug!(operation, name, "done");
    }
    if !outcome.skipped.is_empty() {
        eprintln!(
            "Skipped {} ({skip_reason})",
            outcome
                .skipped
                .iter()
                .map(|n| format!("'{n}'"))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    for (name, err) in &outcome.failed {
        eprintln!("Warning: {operation} failed for '{name}': {err}");
    }
    outcome.into_result(operation).map(|_| ())
}

fn render_processes(processes: &[Process]) -> String {
    if processes.is_empty() {
        return "No processes\n".to_string();
    }

    let name_width = processes
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(0)
        .max(4);
    let mut out = format!(
        "{:<4}  {:<name_width$}  {:<15}  {:<7}  {:<10}  COMMAND\n",
        "SLOT", "NAME", "STATUS", "PID", "FLAGS"
    );
    for p in processes {
        let mut flags = Vec::new();
        if p.privilege == Privilege::Sudo {
            flags.push("sudo");
        }
        if p.mode == ExecMode::Shell {
            flags.push("shell");
        }
        let flags = if flags.is_empty() {
            "-".to_string()
        } else {
            flags.join(",")
        };
        let pid = match p.pid {
            Some(pid) if p.is_running() => pid.to_string(),
            _ => "-".to_string(),
        };
        out.push_str(&format!(
            "{:<4}  {:<name_width$}  {:<15}  {:<7}  {:<10}  {}\n",
            p.slot,
            p.name,
            p.status.to_string(),
            pid,
            flags,
            p.command
        ));
    }
    out
}

fn render_groups(groups: &[GroupSummary]) -> String {
    if groups.is_empty() {
        return "No groups\n".to_string();
    }
    groups
        .iter()
        .map(|g| {
            format!(
                "{:<20}  {} process(es), {} running\n",
                g.name, g.processes, g.running
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::cli::{SignalArgs, TargetArgs};
    use crate::process::RunStatus;
    use std::io::Write;
    use std::time::Duration;

    struct NoWait;

    impl Clock for NoWait {
        fn sleep(&self, _: Duration) {}
    }

    fn process(name: &str, status: RunStatus) -> Process {
        Process {
            name: name.to_string(),
            slot: 1,
            command: "serve --port 80".to_string(),
            mode: ExecMode::Exec,
            privilege: Privilege::Normal,
            workdir: None,
            status,
            pid: Some(4242),
        }
    }

    #[test]
    fn test_render_processes_columns() {
        let mut sudo = process("backend", RunStatus::Exited(Some(1)));
        sudo.slot = 2;
        sudo.privilege = Privilege::Sudo;
        sudo.mode = ExecMode::Shell;
        let text = render_processes(&[process("web", RunStatus::Running), sudo]);
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("SLOT"));
        assert!(lines[1].contains("running") && lines[1].contains("4242"));
        assert!(lines[2].contains("exited (1)"));
        assert!(lines[2].contains("sudo,shell"));
        assert!(!lines[2].contains("4242"));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_processes(&[]), "No processes\n");
        assert_eq!(render_groups(&[]), "No groups\n");
    }

    #[test]
    fn test_overrides_win() {
        let request = LaunchRequest::new("web", "serve");
        let request = apply_overrides(request, true, true, Some(PathBuf::from("/srv")));
        assert_eq!(request.privilege, Privilege::Sudo);
        assert_eq!(request.mode, ExecMode::Shell);
        assert_eq!(request.workdir, Some(PathBuf::from("/srv")));

        let untouched = apply_overrides(LaunchRequest::new("web", "serve"), false, false, None);
        assert_eq!(untouched, LaunchRequest::new("web", "serve"));
    }

    #[test]
    fn test_init_with_definitions() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[web]\ncmd = \"serve\"\n\n[off]\ncmd = \"idle\"\nenabled = false\n\n[db]\ncmd = \"postgres\"\n"
        )
        .unwrap();

        let tmux = FakeBackend::new();
        Dispatcher::new(&tmux, &NoWait)
            .run(Commands::Init {
                group: "g".into(),
                config: Some(file.path().to_path_buf()),
            })
            .unwrap();

        assert_eq!(tmux.session_names(), ["g"]);
        assert_eq!(tmux.slots("g"), [0, 1, 2]);
        assert_eq!(tmux.window("g", 1).unwrap().name, "web");
        assert_eq!(tmux.window("g", 2).unwrap().name, "db");
    }

    #[test]
    fn test_init_bad_file_creates_nothing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[web]\nenabled = true\n").unwrap();

        let tmux = FakeBackend::new();
        let err = Dispatcher::new(&tmux, &NoWait)
            .run(Commands::Init {
                group: "g".into(),
                config: Some(file.path().to_path_buf()),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(tmux.session_names().is_empty());
    }

    #[test]
    fn test_init_continues_past_failed_definition() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[a]\ncmd = \"serve\"\n\n[b]\ncmd = \"serve\"\ndir = \"/nonexistent/pgm-dir\"\n\n[c]\ncmd = \"serve\"\n"
        )
        .unwrap();

        let tmux = FakeBackend::new();
        let err = Dispatcher::new(&tmux, &NoWait)
            .run(Commands::Init {
                group: "g".into(),
                config: Some(file.path().to_path_buf()),
            })
            .unwrap_err();

        match &err {
            PgmError::Bulk { failed, .. } => assert_eq!(failed, &["b".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.exit_code(), 1);
        assert_eq!(tmux.window("g", 1).unwrap().name, "a");
        assert_eq!(tmux.window("g", 2).unwrap().name, "c");
    }

    #[test]
    fn test_add_duplicate_fails_before_password_prompt() {
        let tmux = FakeBackend::with_group("g");
        tmux.insert_window("g", 1, "web", "serve", false);
        let request = LaunchRequest {
            privilege: Privilege::Sudo,
            ..LaunchRequest::new("web", "serve")
        };

        let err = Dispatcher::new(&tmux, &NoWait)
            .add("g", &request)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("already exists"));
        assert_eq!(tmux.slots("g"), [0, 1]);
    }

    #[test]
    fn test_add_to_missing_group() {
        let tmux = FakeBackend::new();
        let err = Dispatcher::new(&tmux, &NoWait)
            .add("g", &LaunchRequest::new("web", "serve"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_add_from_file_missing_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[web]\ncmd = \"serve\"\n").unwrap();
        let err = request_from_file(file.path(), "db").unwrap_err();
        assert!(err.to_string().contains("no section 'db'"));
    }

    #[test]
    fn test_add_from_file_disabled_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[web]\ncmd = \"serve\"\nenabled = false\n").unwrap();
        assert_eq!(request_from_file(file.path(), "web").unwrap(), None);
    }

    #[test]
    fn test_stop_all_with_exited_member_succeeds() {
        let tmux = FakeBackend::with_group("g");
        tmux.insert_window("g", 1, "a", "serve", false);
        tmux.insert_window("g", 2, "b", "serve", true);

        Dispatcher::new(&tmux, &NoWait)
            .run(Commands::Stop {
                group: "g".into(),
                target: TargetArgs {
                    name: None,
                    all: true,
                },
                remove: false,
                signal: SignalArgs::default(),
            })
            .unwrap();
        assert_eq!(tmux.sent_keys().len(), 1);
    }

    #[test]
    fn test_old_backend_rejected_before_dispatch() {
        let tmux = FakeBackend::with_version("tmux 2.1");
        let err = Dispatcher::new(&tmux, &NoWait)
            .run(Commands::Groups)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Environment);
    }
}
