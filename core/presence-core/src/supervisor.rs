//! Lifecycle control of the managed application.
//!
//! Every action is best-effort: failures are logged and swallowed so the
//! controller loop keeps running. Start and stop go through a control script,
//! invoked as `<interpreter> <script> start <layout> <refresh>` and
//! `<interpreter> <script> stop`.

use crate::command::{CommandRunner, CommandSpec};
use crate::config::{AppConfig, SessionConfig, TimingConfig};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, System, UpdateKind};
use tracing::{error, info, warn};

pub trait ProcessSupervisor {
    fn is_installed(&self) -> bool;
    fn is_running(&self) -> bool;
    /// Starts the application. A running instance cannot be reconfigured in
    /// place, so it is stopped and restarted.
    fn start(&self, session: &SessionConfig);
    fn stop(&self);
}

/// OS process table seam.
pub trait ProcessTable {
    /// True if a process other than the caller has `identity` in its name or
    /// in any of its arguments.
    fn any_matching(&self, identity: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct SysinfoProcessTable;

impl ProcessTable for SysinfoProcessTable {
    fn any_matching(&self, identity: &str) -> bool {
        let mut sys = System::new();
        sys.refresh_processes_specifics(ProcessRefreshKind::new().with_cmd(UpdateKind::Always));

        let own_pid = Pid::from(std::process::id() as usize);
        // Linux lists each of our threads as its own entry carrying our
        // command line; none of them is the managed application.
        let own_cmd = sys.process(own_pid).map(|process| process.cmd());
        sys.processes().iter().any(|(pid, process)| {
            *pid != own_pid
                && !own_cmd.is_some_and(|cmd| !cmd.is_empty() && cmd == process.cmd())
                && (process.name().contains(identity)
                    || process.cmd().iter().any(|arg| arg.contains(identity)))
        })
    }
}

#[derive(Debug)]
pub struct ScriptSupervisor<R: CommandRunner, T: ProcessTable> {
    runner: R,
    processes: T,
    install_path: PathBuf,
    identity: String,
    interpreter: String,
    control_scripts: Vec<PathBuf>,
    launch_command: Option<CommandSpec>,
    quit_command: Option<CommandSpec>,
    restart_settle: Duration,
    timeout: Duration,
}

impl<R: CommandRunner, T: ProcessTable> ScriptSupervisor<R, T> {
    pub fn new(runner: R, processes: T, app: &AppConfig, timing: &TimingConfig) -> Self {
        Self {
            runner,
            processes,
            install_path: app.install_path.clone(),
            identity: app.process_identity.clone(),
            interpreter: app.interpreter.clone(),
            control_scripts: app.control_scripts.clone(),
            launch_command: app.launch_command.clone(),
            quit_command: app.quit_command.clone(),
            restart_settle: timing.restart_settle(),
            timeout: timing.control_timeout(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// First control script candidate that exists on disk.
    pub fn resolve_control_script(&self) -> Option<&Path> {
        self.control_scripts
            .iter()
            .find(|path| path.exists())
            .map(PathBuf::as_path)
    }

    /// The control script with session arguments, or the direct launch
    /// command when no script is installed.
    fn start_command(&self, session: &SessionConfig) -> Option<CommandSpec> {
        if let Some(script) = self.resolve_control_script() {
            let refresh = session.refresh_rate.as_arg();
            return Some(self.script_command(
                script,
                &["start", session.layout.as_arg(), &refresh],
            ));
        }
        let command = self.launch_command.clone()?;
        warn!(
            command = %command,
            "No control script found; launching directly without session config"
        );
        Some(command)
    }

    fn stop_command(&self) -> Option<CommandSpec> {
        match self.resolve_control_script() {
            Some(script) => Some(self.script_command(script, &["stop"])),
            None => self.quit_command.clone(),
        }
    }

    fn script_command(&self, script: &Path, action: &[&str]) -> CommandSpec {
        let mut args = vec![script.display().to_string()];
        args.extend(action.iter().map(|arg| arg.to_string()));
        CommandSpec::new(self.interpreter.clone(), args)
    }

    /// Returns `true` on a zero exit status.
    fn run_control(&self, spec: &CommandSpec) -> bool {
        info!(command = %spec, "Running control command");

        match self.runner.run(spec, self.timeout) {
            Ok(output) => {
                let text = output.combined_lossy();
                if !text.is_empty() {
                    info!(output = %text, "Control command output");
                }
                if output.success() {
                    true
                } else {
                    warn!(code = ?output.code, command = %spec, "Control command failed");
                    false
                }
            }
            Err(err) => {
                warn!(error = %err, "Failed to run control command");
                false
            }
        }
    }
}

impl<R: CommandRunner, T: ProcessTable> ProcessSupervisor for ScriptSupervisor<R, T> {
    fn is_installed(&self) -> bool {
        self.install_path.exists()
    }

    fn is_running(&self) -> bool {
        self.processes.any_matching(&self.identity)
    }

    fn start(&self, session: &SessionConfig) {
        if !self.is_installed() {
            warn!(
                path = %self.install_path.display(),
                "Managed application not installed; skipping start"
            );
            return;
        }

        if self.is_running() {
            info!("Managed application already running; restarting with session config");
            self.stop();
            thread::sleep(self.restart_settle);
        }

        let Some(command) = self.start_command(session) else {
            error!("No control mechanism available; cannot start managed application");
            return;
        };
        if self.run_control(&command) {
            info!(
                layout = %session.layout,
                refresh_rate = %session.refresh_rate,
                "Managed application started"
            );
        }
    }

    fn stop(&self) {
        let Some(command) = self.stop_command() else {
            error!("No control mechanism available; cannot stop managed application");
            return;
        };
        if self.run_control(&command) {
            info!("Managed application stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::config::{Layout, RefreshRate};
    use crate::error::{PresenceError, Result};
    use std::cell::RefCell;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingRunner {
        calls: RefCell<Vec<(Vec<String>, Instant)>>,
        exit_code: i32,
        spawn_fails: bool,
    }

    impl RecordingRunner {
        fn commands(&self) -> Vec<Vec<String>> {
            self.calls
                .borrow()
                .iter()
                .map(|(call, _)| call.clone())
                .collect()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, spec: &CommandSpec, _timeout: Duration) -> Result<CommandOutput> {
            let mut call = vec![spec.program.clone()];
            call.extend(spec.args.iter().cloned());
            self.calls.borrow_mut().push((call, Instant::now()));
            if self.spawn_fails {
                return Err(PresenceError::Spawn {
                    command: spec.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            Ok(CommandOutput {
                code: Some(self.exit_code),
                stdout: b"ok".to_vec(),
                stderr: Vec::new(),
            })
        }
    }

    struct FixedTable(bool);

    impl ProcessTable for FixedTable {
        fn any_matching(&self, _identity: &str) -> bool {
            self.0
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        app: AppConfig,
        timing: TimingConfig,
        script: PathBuf,
    }

    fn fixture(installed: bool) -> Fixture {
        let dir = tempfile::tempdir().expect("temp dir");
        let install_path = dir.path().join("SpaceWalker.app");
        if installed {
            std::fs::create_dir(&install_path).expect("install dir");
        }
        let script = dir.path().join("control.sh");
        std::fs::write(&script, "#!/bin/sh\n").expect("script");

        let app = AppConfig {
            install_path,
            process_identity: "SpaceWalker".to_string(),
            interpreter: "/bin/bash".to_string(),
            control_scripts: vec![dir.path().join("missing.sh"), script.clone()],
            launch_command: Some(CommandSpec::new("/usr/bin/open", ["-a", "SpaceWalker"])),
            quit_command: Some(CommandSpec::new("/usr/bin/pkill", ["-x", "SpaceWalker"])),
        };
        let timing = TimingConfig {
            restart_settle_ms: 0,
            ..TimingConfig::default()
        };
        Fixture {
            _dir: dir,
            app,
            timing,
            script,
        }
    }

    fn without_scripts(mut fixture: Fixture) -> Fixture {
        fixture.app.control_scripts =
            vec![PathBuf::from("/nope/a.sh"), PathBuf::from("/nope/b.sh")];
        fixture
    }

    fn supervisor(
        fixture: &Fixture,
        running: bool,
        runner: RecordingRunner,
    ) -> ScriptSupervisor<RecordingRunner, FixedTable> {
        ScriptSupervisor::new(runner, FixedTable(running), &fixture.app, &fixture.timing)
    }

    /// Script arguments after the interpreter and script path.
    fn actions(supervisor: &ScriptSupervisor<RecordingRunner, FixedTable>) -> Vec<Vec<String>> {
        supervisor
            .runner()
            .commands()
            .iter()
            .map(|call| call[2..].to_vec())
            .collect()
    }

    #[test]
    fn resolves_first_existing_control_script() {
        let fixture = fixture(true);
        let supervisor = supervisor(&fixture, false, RecordingRunner::default());
        assert_eq!(supervisor.resolve_control_script(), Some(fixture.script.as_path()));
    }

    #[test]
    fn resolves_nothing_when_no_script_exists() {
        let fixture = without_scripts(fixture(true));
        let supervisor = supervisor(&fixture, false, RecordingRunner::default());
        assert_eq!(supervisor.resolve_control_script(), None);
    }

    #[test]
    fn start_invokes_script_with_session_arguments() {
        let fixture = fixture(true);
        let supervisor = supervisor(&fixture, false, RecordingRunner::default());
        supervisor.start(&SessionConfig::default());

        assert_eq!(
            supervisor.runner().commands(),
            vec![vec![
                "/bin/bash".to_string(),
                fixture.script.display().to_string(),
                "start".to_string(),
                "threewide".to_string(),
                "120hz".to_string(),
            ]]
        );
    }

    #[test]
    fn start_restarts_running_application_after_settle() {
        let mut fixture = fixture(true);
        fixture.timing.restart_settle_ms = 150;
        let supervisor = supervisor(&fixture, true, RecordingRunner::default());
        let session = SessionConfig {
            layout: Layout::new("sidebyside"),
            refresh_rate: RefreshRate::hz(60),
        };
        supervisor.start(&session);

        assert_eq!(
            actions(&supervisor),
            vec![
                vec!["stop".to_string()],
                vec![
                    "start".to_string(),
                    "sidebyside".to_string(),
                    "60hz".to_string()
                ],
            ]
        );
        let calls = supervisor.runner().calls.borrow();
        let settled = calls[1].1.duration_since(calls[0].1);
        assert!(settled >= Duration::from_millis(150), "settled {:?}", settled);
    }

    #[test]
    fn start_is_noop_when_not_installed() {
        let fixture = fixture(false);
        let supervisor = supervisor(&fixture, true, RecordingRunner::default());
        assert!(!supervisor.is_installed());
        supervisor.start(&SessionConfig::default());
        assert!(supervisor.runner().commands().is_empty());
    }

    #[test]
    fn falls_back_to_direct_commands_without_script() {
        let fixture = without_scripts(fixture(true));
        let supervisor = supervisor(&fixture, false, RecordingRunner::default());
        supervisor.start(&SessionConfig::default());
        supervisor.stop();

        assert_eq!(
            supervisor.runner().commands(),
            vec![
                vec!["/usr/bin/open".to_string(), "-a".to_string(), "SpaceWalker".to_string()],
                vec!["/usr/bin/pkill".to_string(), "-x".to_string(), "SpaceWalker".to_string()],
            ]
        );
    }

    #[test]
    fn nothing_runs_without_any_control_mechanism() {
        let mut fixture = without_scripts(fixture(true));
        fixture.app.launch_command = None;
        fixture.app.quit_command = None;
        let supervisor = supervisor(&fixture, false, RecordingRunner::default());
        supervisor.start(&SessionConfig::default());
        supervisor.stop();

        assert!(supervisor.runner().commands().is_empty());
    }

    #[test]
    fn failures_are_swallowed() {
        let fixture = fixture(true);
        let failing = supervisor(
            &fixture,
            false,
            RecordingRunner {
                exit_code: 2,
                ..RecordingRunner::default()
            },
        );
        failing.start(&SessionConfig::default());
        failing.stop();
        assert_eq!(actions(&failing).len(), 2);

        let unspawnable = supervisor(
            &fixture,
            false,
            RecordingRunner {
                spawn_fails: true,
                ..RecordingRunner::default()
            },
        );
        unspawnable.stop();
        assert_eq!(actions(&unspawnable), vec![vec!["stop".to_string()]]);
    }

    #[test]
    fn sysinfo_table_reports_unknown_identity_absent() {
        assert!(!SysinfoProcessTable.any_matching("presenced-identity-that-does-not-exist"));
    }

    #[test]
    fn sysinfo_table_ignores_own_threads() {
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let worker = thread::spawn(move || {
            let _ = stop_rx.recv();
        });

        let exe = std::env::current_exe().expect("current exe");
        let name = exe
            .file_name()
            .expect("exe file name")
            .to_string_lossy()
            .into_owned();
        let matched = SysinfoProcessTable.any_matching(&name);

        drop(stop_tx);
        worker.join().expect("worker thread");
        assert!(!matched);
    }
}
