//! SIGTERM and SIGINT both request the same orderly shutdown: the controller
//! loop returns, the instance lock is dropped, and the process exits 0.

use crossbeam_channel::Sender;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::thread;
use tracing::info;

pub fn forward_termination(shutdown: Sender<()>) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    thread::spawn(move || {
        for signal in signals.forever() {
            let name = if signal == SIGTERM { "SIGTERM" } else { "SIGINT" };
            info!(signal = name, "Received termination signal, shutting down");
            // Full or disconnected both mean shutdown is already under way.
            let _ = shutdown.try_send(());
        }
    });
    Ok(())
}
