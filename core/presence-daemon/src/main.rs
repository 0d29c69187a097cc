//! presenced: starts and stops a companion application as a display
//! peripheral is attached and detached.
//!
//! ## Subcommands
//!
//! - `run`: the controller daemon. Holds the instance lock until SIGTERM/SIGINT.
//! - `detect`: one-shot presence report for checking markers and commands.

mod logging;
mod signals;

use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{bounded, unbounded, Sender};
use presence_core::{
    build_controller, build_detector, display_events_supported, load_config, DaemonConfig,
    EventSource, InstanceLock, LoopExit, PollingSource, PresenceError, PresenceSignal,
    SourceEvent, SourceMode,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "presenced")]
#[command(about = "Presence-triggered session manager for a display peripheral")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller until SIGTERM or SIGINT
    Run {
        /// Config file (defaults to ~/.presenced/config.toml)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Override the configured event source
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Check peripheral presence once and report both signals
    Detect {
        /// Config file (defaults to ~/.presenced/config.toml)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Display reconfiguration notifications (macOS)
    Event,
    /// Fixed-interval polling
    Poll,
}

impl From<ModeArg> for SourceMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Event => SourceMode::Event,
            ModeArg::Poll => SourceMode::Poll,
        }
    }
}

#[derive(Serialize)]
struct DetectReport {
    #[serde(flatten)]
    signal: PresenceSignal,
    present: bool,
}

fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run { config, mode } => run(config.as_deref(), mode),
        Commands::Detect { config, json } => detect(config.as_deref(), json),
    };
    std::process::exit(code);
}

fn run(config_path: Option<&Path>, mode: Option<ModeArg>) -> i32 {
    let config = load_config(config_path);
    let log_file = match &config {
        Ok(config) => config.paths.log_file.clone(),
        Err(_) => DaemonConfig::default().paths.log_file,
    };
    let _logging_guard = logging::init_daemon(&log_file);

    let mut config = match config {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load config");
            return 1;
        }
    };
    if let Some(mode) = mode {
        config.mode = mode.into();
    }

    // Installed before the lock exists so a signal can never skip its cleanup.
    let (shutdown_tx, shutdown_rx) = bounded(1);
    if let Err(err) = signals::forward_termination(shutdown_tx) {
        error!(error = %err, "Failed to install signal handlers");
        return 1;
    }

    let lock = match InstanceLock::acquire(&config.paths.lock_file) {
        Ok(lock) => lock,
        Err(PresenceError::AlreadyRunning { pid }) => {
            error!(pid, "Another instance is already running. Exiting.");
            return 1;
        }
        Err(err) => {
            error!(error = %err, "Failed to acquire instance lock");
            return 1;
        }
    };

    let (event_tx, event_rx) = unbounded();
    let source = match subscribe_source(&config, event_tx) {
        Ok(name) => name,
        Err(err) => {
            error!(error = %err, "Failed to start event source");
            return 1;
        }
    };
    info!(
        source,
        pid = lock.pid(),
        lock = %lock.path().display(),
        "presenced started"
    );

    let mut controller = build_controller(&config);
    controller.bootstrap();
    let exit = controller.run(&event_rx, &shutdown_rx);

    info!(exit = ?exit, state = %controller.state(), "presenced stopped");
    drop(lock);
    match exit {
        LoopExit::Shutdown => 0,
        LoopExit::SourceClosed => 1,
    }
}

/// Subscribes the configured source, falling back to polling when display
/// notifications are unavailable.
fn subscribe_source(
    config: &DaemonConfig,
    sink: Sender<SourceEvent>,
) -> presence_core::Result<&'static str> {
    if config.mode == SourceMode::Event {
        if display_events_supported() {
            #[cfg(target_os = "macos")]
            {
                let mut source = presence_core::DisplayReconfigurationSource::new();
                match source.subscribe(sink.clone()) {
                    Ok(()) => return Ok(source.name()),
                    Err(err) => {
                        warn!(
                            error = %err,
                            "Display notifications unavailable; falling back to polling"
                        );
                    }
                }
            }
        } else {
            warn!("Display notifications not supported on this platform; falling back to polling");
        }
    }

    let mut source = PollingSource::new(config.timing.poll_interval());
    source.subscribe(sink)?;
    info!(interval = ?source.interval(), "Polling for presence");
    Ok(source.name())
}

fn detect(config_path: Option<&Path>, json: bool) -> i32 {
    logging::init_cli();

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load config");
            return 1;
        }
    };

    let signal = build_detector(&config).signal();
    let report = DetectReport {
        signal,
        present: signal.present(),
    };

    if json {
        match serde_json::to_string(&report) {
            Ok(line) => println!("{}", line),
            Err(err) => {
                error!(error = %err, "Failed to serialize report");
                return 1;
            }
        }
    } else {
        println!("USB connected: {}", report.signal.on_bus);
        println!("Display listed: {}", report.signal.listed_as_display);
        println!(
            "Peripheral is {}",
            if report.present {
                "CONNECTED"
            } else {
                "DISCONNECTED"
            }
        );
    }
    0
}
