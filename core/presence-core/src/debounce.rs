//! Cancel-and-replace single-shot timers, one per direction.
//!
//! A physical replug fires several display notifications in quick succession.
//! Each one reschedules the pending check, so the burst collapses into a single
//! check one interval after the last notification.
//!
//! The scheduler holds deadlines only; the controller loop sleeps until
//! [`DebounceScheduler::next_deadline`] and then collects what expired. Time is
//! always passed in, which keeps this module free of clocks.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Re-evaluate presence after display-added notifications settle.
    ConnectCheck,
    /// Tear down the session once a removal has not been contradicted.
    DisconnectAction,
    /// Start the managed application once a confirmed connect has settled.
    Launch,
}

#[derive(Debug, Clone)]
pub struct DebounceScheduler {
    connect_interval: Duration,
    disconnect_interval: Duration,
    launch_delay: Duration,
    connect_deadline: Option<Instant>,
    disconnect_deadline: Option<Instant>,
    launch_deadline: Option<Instant>,
}

impl DebounceScheduler {
    pub fn new(connect_interval: Duration, disconnect_interval: Duration) -> Self {
        Self {
            connect_interval,
            disconnect_interval,
            launch_delay: Duration::ZERO,
            connect_deadline: None,
            disconnect_deadline: None,
            launch_deadline: None,
        }
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn launch_delay(&self) -> Duration {
        self.launch_delay
    }

    /// Arms the timer for `direction`, replacing any pending deadline.
    /// Returns `true` when a pending timer was replaced.
    pub fn schedule(&mut self, direction: Direction, now: Instant) -> bool {
        let deadline = now + self.interval(direction);
        self.slot(direction).replace(deadline).is_some()
    }

    /// Returns `true` when a pending timer was cancelled.
    pub fn cancel(&mut self, direction: Direction) -> bool {
        self.slot(direction).take().is_some()
    }

    pub fn is_pending(&self, direction: Direction) -> bool {
        self.deadline(direction).is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.connect_deadline,
            self.disconnect_deadline,
            self.launch_deadline,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Removes and returns every direction whose deadline is at or before
    /// `now`, earliest first.
    pub fn take_expired(&mut self, now: Instant) -> Vec<Direction> {
        let mut expired = Vec::new();
        for (direction, deadline) in [
            (Direction::ConnectCheck, self.connect_deadline),
            (Direction::DisconnectAction, self.disconnect_deadline),
            (Direction::Launch, self.launch_deadline),
        ] {
            if let Some(deadline) = deadline.filter(|deadline| *deadline <= now) {
                expired.push((deadline, direction));
            }
        }
        expired.sort_by_key(|(deadline, _)| *deadline);

        expired
            .into_iter()
            .map(|(_, direction)| {
                self.slot(direction).take();
                direction
            })
            .collect()
    }

    fn interval(&self, direction: Direction) -> Duration {
        match direction {
            Direction::ConnectCheck => self.connect_interval,
            Direction::DisconnectAction => self.disconnect_interval,
            Direction::Launch => self.launch_delay,
        }
    }

    fn deadline(&self, direction: Direction) -> Option<Instant> {
        match direction {
            Direction::ConnectCheck => self.connect_deadline,
            Direction::DisconnectAction => self.disconnect_deadline,
            Direction::Launch => self.launch_deadline,
        }
    }

    fn slot(&mut self, direction: Direction) -> &mut Option<Instant> {
        match direction {
            Direction::ConnectCheck => &mut self.connect_deadline,
            Direction::DisconnectAction => &mut self.disconnect_deadline,
            Direction::Launch => &mut self.launch_deadline,
        }
    }
}
