//! CoreGraphics display reconfiguration callbacks.
//!
//! The callback is registered from a dedicated thread that then parks in its
//! own CFRunLoop. The C callback has no way to carry a Rust closure, so the
//! event sink lives in a process-wide cell; only one source may be subscribed
//! per process.
//!
//! # Threading
//!
//! Quartz delivers reconfiguration callbacks through the run loop of the
//! thread that registered them, which here is the dedicated thread. The main
//! thread never runs a CFRunLoop in this daemon. If callbacks stop arriving on
//! some macOS release, `presenced run --mode poll` is the fallback.

use super::{DisplayChange, EventSource, SourceEvent};
use crate::error::{PresenceError, Result};
use crossbeam_channel::{bounded, Sender};
use once_cell::sync::OnceCell;
use std::ffi::c_void;
use std::thread;
use tracing::{debug, info, warn};

// CGDisplayChangeSummaryFlags
const BEGIN_CONFIGURATION_FLAG: u32 = 1 << 0;
const ADD_FLAG: u32 = 1 << 4;
const REMOVE_FLAG: u32 = 1 << 5;

static SINK: OnceCell<Sender<SourceEvent>> = OnceCell::new();

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGDisplayRegisterReconfigurationCallback(
        callback: extern "C" fn(u32, u32, *mut c_void),
        user_info: *mut c_void,
    ) -> i32;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFRunLoopRun();
}

fn classify(flags: u32) -> Option<DisplayChange> {
    if flags & BEGIN_CONFIGURATION_FLAG != 0 {
        return None;
    }
    if flags & ADD_FLAG != 0 {
        Some(DisplayChange::Added)
    } else if flags & REMOVE_FLAG != 0 {
        Some(DisplayChange::Removed)
    } else {
        None
    }
}

extern "C" fn on_reconfiguration(display: u32, flags: u32, _user_info: *mut c_void) {
    debug!(display, flags, "Display reconfiguration");
    let Some(change) = classify(flags) else {
        return;
    };
    info!(display, change = ?change, "Display topology changed");
    if let Some(sink) = SINK.get() {
        let _ = sink.send(SourceEvent::Display(change));
    }
}

#[derive(Debug, Default)]
pub struct DisplayReconfigurationSource;

impl DisplayReconfigurationSource {
    pub fn new() -> Self {
        Self
    }
}

impl EventSource for DisplayReconfigurationSource {
    fn name(&self) -> &'static str {
        "display-events"
    }

    fn subscribe(&mut self, sink: Sender<SourceEvent>) -> Result<()> {
        SINK.set(sink).map_err(|_| {
            PresenceError::SourceUnavailable("display callback already registered".to_string())
        })?;

        let (registered_tx, registered_rx) = bounded(1);
        thread::spawn(move || {
            let status = unsafe {
                CGDisplayRegisterReconfigurationCallback(on_reconfiguration, std::ptr::null_mut())
            };
            let _ = registered_tx.send(status);
            if status != 0 {
                return;
            }
            unsafe { CFRunLoopRun() };
            warn!("Display run loop exited");
        });

        match registered_rx.recv() {
            Ok(0) => Ok(()),
            Ok(status) => Err(PresenceError::SourceUnavailable(format!(
                "CGDisplayRegisterReconfigurationCallback returned {}",
                status
            ))),
            Err(_) => Err(PresenceError::SourceUnavailable(
                "display thread exited before registering".to_string(),
            )),
        }
    }
}
