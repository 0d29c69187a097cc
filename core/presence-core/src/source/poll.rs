use super::{EventSource, SourceEvent};
use crate::error::Result;
use crossbeam_channel::{tick, Sender};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Emits [`SourceEvent::Tick`] every `interval`. The first tick arrives one
/// interval after subscribing.
#[derive(Debug, Clone)]
pub struct PollingSource {
    interval: Duration,
}

impl PollingSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl EventSource for PollingSource {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn subscribe(&mut self, sink: Sender<SourceEvent>) -> Result<()> {
        let ticker = tick(self.interval);
        thread::spawn(move || {
            for _ in ticker.iter() {
                if sink.send(SourceEvent::Tick).is_err() {
                    debug!("Poll receiver gone; stopping ticker");
                    break;
                }
            }
        });
        Ok(())
    }
}
