//! # presence-core
//!
//! Device-presence detection and session-lifecycle control for `presenced`.
//!
//! ## Design Principles
//!
//! - **Synchronous**: no async runtime. One controller thread owns all state;
//!   background threads only send messages to it.
//! - **Graceful degradation**: a failed inventory query or control-script run
//!   is logged and treated as an absent signal, never as a fatal error.
//! - **Seams at the OS boundary**: inventory text, process launching and the
//!   process table are traits, so the pipeline runs in tests without devices.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use presence_core::*;
//!
//! let config = load_config(None)?;
//! let _lock = InstanceLock::acquire(&config.paths.lock_file)?;
//! let mut controller = build_controller(&config);
//! controller.bootstrap();
//! ```

pub mod command;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod detector;
pub mod error;
pub mod instance;
pub mod inventory;
pub mod session;
pub mod source;
pub mod supervisor;

pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use config::{
    default_config_path, load_config, AppConfig, DaemonConfig, DetectionConfig, Layout,
    PathsConfig, RefreshRate, SessionConfig, SourceMode, TimingConfig,
};
pub use controller::{Controller, LoopExit};
pub use debounce::{DebounceScheduler, Direction};
pub use detector::{PresenceDetector, PresenceMarkers, PresenceSignal};
pub use error::{PresenceError, Result};
pub use instance::InstanceLock;
pub use inventory::{CommandInventory, InventoryQuery};
pub use session::{SessionState, SessionStateMachine, Transition};
pub use source::{
    display_events_supported, DisplayChange, EventSource, PollingSource, SourceEvent,
};
pub use supervisor::{ProcessSupervisor, ProcessTable, ScriptSupervisor, SysinfoProcessTable};

#[cfg(target_os = "macos")]
pub use source::DisplayReconfigurationSource;

/// Production detector: inventory commands from the config, run for real.
pub type SystemDetector = PresenceDetector<CommandInventory<SystemRunner>>;

/// Production supervisor: control script and sysinfo process table.
pub type SystemSupervisor = ScriptSupervisor<SystemRunner, SysinfoProcessTable>;

pub fn build_detector(config: &DaemonConfig) -> SystemDetector {
    let inventory = CommandInventory::from_config(
        SystemRunner,
        &config.detection,
        config.timing.query_timeout(),
    );
    PresenceDetector::new(inventory, PresenceMarkers::from(&config.detection))
}

pub fn build_controller(
    config: &DaemonConfig,
) -> Controller<CommandInventory<SystemRunner>, SystemSupervisor> {
    let supervisor =
        ScriptSupervisor::new(SystemRunner, SysinfoProcessTable, &config.app, &config.timing);
    let scheduler = DebounceScheduler::new(
        config.timing.connect_debounce(),
        config.timing.disconnect_debounce(),
    )
    .with_launch_delay(config.timing.connect_launch_delay());
    Controller::new(
        build_detector(config),
        supervisor,
        scheduler,
        config.session.clone(),
    )
}
