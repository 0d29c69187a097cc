//! The controller loop.
//!
//! One thread owns the session state and the debounce timers. It waits on
//! three things at once: source events, the nearest timer deadline, and the
//! shutdown channel. A confirmed connect starts the managed application only
//! after the launch delay, giving the new display time to settle.
//!
//! Everything the loop calls (inventory queries, control script runs) is
//! synchronous and bounded by a timeout, so at most one presence check and
//! one supervisor action are ever in flight.
//!
//! ```text
//! EventSource ──► DebounceScheduler ──► PresenceDetector ──► SessionStateMachine ──► ProcessSupervisor
//!   (tick / display added|removed)        (usb && display)       (idempotent guard)      (start / stop)
//! ```

use crate::config::SessionConfig;
use crate::debounce::{DebounceScheduler, Direction};
use crate::detector::PresenceDetector;
use crate::inventory::InventoryQuery;
use crate::session::{SessionState, SessionStateMachine, Transition};
use crate::source::{DisplayChange, SourceEvent};
use crate::supervisor::ProcessSupervisor;
use crossbeam_channel::{at, never, select, Receiver};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why [`Controller::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Shutdown,
    SourceClosed,
}

pub struct Controller<Q: InventoryQuery, S: ProcessSupervisor> {
    detector: PresenceDetector<Q>,
    supervisor: S,
    machine: SessionStateMachine,
    scheduler: DebounceScheduler,
    session: SessionConfig,
}

impl<Q: InventoryQuery, S: ProcessSupervisor> Controller<Q, S> {
    pub fn new(
        detector: PresenceDetector<Q>,
        supervisor: S,
        scheduler: DebounceScheduler,
        session: SessionConfig,
    ) -> Self {
        Self {
            detector,
            supervisor,
            machine: SessionStateMachine::new(),
            scheduler,
            session,
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Seeds the state from an initial presence check, starting the managed
    /// application if the peripheral is already attached.
    pub fn bootstrap(&mut self) -> SessionState {
        let present = self.detector.detect();
        if present {
            info!("Peripheral detected on startup");
        } else {
            info!("No peripheral detected on startup");
        }
        let transition = self.machine.observe(present);
        self.apply(transition, Instant::now());
        self.state()
    }

    pub fn handle_event(&mut self, event: SourceEvent, now: Instant) {
        match event {
            SourceEvent::Tick => self.check_presence(now),
            SourceEvent::Display(DisplayChange::Added) => {
                // A display coming back supersedes a pending teardown; the
                // connect check below decides whether the peripheral is back.
                if self.scheduler.cancel(Direction::DisconnectAction) {
                    info!("Display added; pending disconnect cancelled");
                }
                if self.scheduler.schedule(Direction::ConnectCheck, now) {
                    debug!("Connect check rescheduled");
                }
            }
            SourceEvent::Display(DisplayChange::Removed) => {
                if self.scheduler.schedule(Direction::DisconnectAction, now) {
                    debug!("Disconnect action rescheduled");
                }
            }
        }
    }

    /// Runs every debounce timer due at `now`.
    pub fn fire_expired(&mut self, now: Instant) {
        for direction in self.scheduler.take_expired(now) {
            match direction {
                Direction::ConnectCheck => self.check_presence(now),
                Direction::DisconnectAction => {
                    let transition = self.machine.force_disconnect();
                    self.apply(transition, now);
                }
                Direction::Launch => self.launch(),
            }
        }
    }

    /// Processes events until shutdown is signalled or the source goes away.
    pub fn run(&mut self, events: &Receiver<SourceEvent>, shutdown: &Receiver<()>) -> LoopExit {
        info!(state = %self.state(), "Controller loop running");
        loop {
            let timer = match self.scheduler.next_deadline() {
                Some(deadline) => at(deadline),
                None => never(),
            };

            select! {
                recv(shutdown) -> _ => {
                    info!(state = %self.state(), "Shutdown requested");
                    return LoopExit::Shutdown;
                }
                recv(events) -> event => match event {
                    Ok(event) => self.handle_event(event, Instant::now()),
                    Err(_) => {
                        warn!("Event source closed");
                        return LoopExit::SourceClosed;
                    }
                },
                recv(timer) -> _ => self.fire_expired(Instant::now()),
            }
        }
    }

    fn check_presence(&mut self, now: Instant) {
        let present = self.detector.detect();
        let transition = self.machine.observe(present);
        self.apply(transition, now);
    }

    fn apply(&mut self, transition: Option<Transition>, now: Instant) {
        match transition {
            Some(Transition::Connect) => {
                let delay = self.scheduler.launch_delay();
                if delay.is_zero() {
                    self.launch();
                } else {
                    info!(
                        delay = ?delay,
                        "Peripheral connected; launching after display settles"
                    );
                    self.scheduler.schedule(Direction::Launch, now);
                }
            }
            Some(Transition::Disconnect) => {
                if self.scheduler.cancel(Direction::Launch) {
                    info!("Pending launch cancelled");
                }
                info!("Peripheral disconnected; stopping managed application");
                self.supervisor.stop();
            }
            None => {}
        }
    }

    fn launch(&mut self) {
        info!(
            layout = %self.session.layout,
            refresh_rate = %self.session.refresh_rate,
            "Starting managed application"
        );
        self.supervisor.start(&self.session);
    }
}
