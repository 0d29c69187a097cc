//! Event sources that drive presence re-evaluation.
//!
//! Two interchangeable mechanisms feed the same detector and state machine:
//!
//! - [`PollingSource`]: a fixed-interval tick. Every tick re-detects and feeds
//!   the raw result straight to the state machine.
//! - [`DisplayReconfigurationSource`] (macOS): CoreGraphics display
//!   reconfiguration callbacks, reported as added/removed notifications that
//!   the controller debounces.
//!
//! Sources only produce messages; they never touch session state.

mod poll;

#[cfg(target_os = "macos")]
mod display;

pub use poll::PollingSource;

#[cfg(target_os = "macos")]
pub use display::DisplayReconfigurationSource;

use crate::error::Result;
use crossbeam_channel::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayChange {
    Added,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    /// Display topology changed. Debounced by the controller.
    Display(DisplayChange),
    /// Poll interval elapsed. Detected and applied immediately.
    Tick,
}

pub trait EventSource {
    fn name(&self) -> &'static str;

    /// Starts delivering events into `sink` from a background thread. Delivery
    /// stops once the receiving side is dropped.
    fn subscribe(&mut self, sink: Sender<SourceEvent>) -> Result<()>;
}

/// True when this platform has a display notification source.
pub const fn display_events_supported() -> bool {
    cfg!(target_os = "macos")
}
