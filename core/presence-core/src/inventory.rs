//! Raw device inventory.
//!
//! The detector never parses structure out of these reports; it only looks for
//! substrings. Anything that can produce text (ioreg, system_profiler, lsusb,
//! a test fixture) can stand behind [`InventoryQuery`].

use crate::command::{CommandRunner, CommandSpec};
use crate::config::DetectionConfig;
use crate::error::Result;
use std::time::Duration;

pub trait InventoryQuery {
    /// Text describing the devices currently enumerated on the USB bus.
    fn usb_devices(&self) -> Result<String>;

    /// Text describing the currently listed displays.
    fn displays(&self) -> Result<String>;
}

/// Inventory backed by two external commands.
#[derive(Debug, Clone)]
pub struct CommandInventory<R: CommandRunner> {
    runner: R,
    usb_command: CommandSpec,
    display_command: CommandSpec,
    timeout: Duration,
}

impl<R: CommandRunner> CommandInventory<R> {
    pub fn new(
        runner: R,
        usb_command: CommandSpec,
        display_command: CommandSpec,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            usb_command,
            display_command,
            timeout,
        }
    }

    pub fn from_config(runner: R, config: &DetectionConfig, timeout: Duration) -> Self {
        Self::new(
            runner,
            config.usb_command.clone(),
            config.display_command.clone(),
            timeout,
        )
    }

    fn query(&self, spec: &CommandSpec) -> Result<String> {
        self.runner.run(spec, self.timeout)?.into_text(spec)
    }
}

impl<R: CommandRunner> InventoryQuery for CommandInventory<R> {
    fn usb_devices(&self) -> Result<String> {
        self.query(&self.usb_command)
    }

    fn displays(&self) -> Result<String> {
        self.query(&self.display_command)
    }
}
