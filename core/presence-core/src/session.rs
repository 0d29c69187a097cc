//! Connected/disconnected session state.
//! Display notifications fire for unrelated changes too, so an observation
//! that matches the current state must never re-run start or stop.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("disconnected"),
            SessionState::Connected => f.write_str("connected"),
        }
    }
}

/// A confirmed state change the caller must act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connect,
    Disconnect,
}

pub fn next_state(current: SessionState, present: bool) -> (SessionState, Option<Transition>) {
    match (current, present) {
        (SessionState::Disconnected, true) => (SessionState::Connected, Some(Transition::Connect)),
        (SessionState::Connected, false) => {
            (SessionState::Disconnected, Some(Transition::Disconnect))
        }
        (state, _) => (state, None),
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionStateMachine {
    state: SessionState,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Feeds one presence observation.
    pub fn observe(&mut self, present: bool) -> Option<Transition> {
        let (state, transition) = next_state(self.state, present);
        self.state = state;
        transition
    }

    /// Trusted removal: disconnects without a fresh presence observation.
    pub fn force_disconnect(&mut self) -> Option<Transition> {
        self.observe(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_disconnected() {
        assert_eq!(SessionStateMachine::new().state(), SessionState::Disconnected);
    }

    #[test]
    fn test_presence_connects_once() {
        let mut machine = SessionStateMachine::new();
        let transitions: Vec<_> = [true, true, true]
            .into_iter()
            .filter_map(|present| machine.observe(present))
            .collect();
        assert_eq!(transitions, vec![Transition::Connect]);
        assert_eq!(machine.state(), SessionState::Connected);
    }

    #[test]
    fn test_absence_disconnects_once() {
        let mut machine = SessionStateMachine::new();
        machine.observe(true);
        assert_eq!(machine.observe(false), Some(Transition::Disconnect));
        assert_eq!(machine.observe(false), None);
        assert_eq!(machine.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_absence_while_disconnected_is_noop() {
        let mut machine = SessionStateMachine::new();
        assert_eq!(machine.observe(false), None);
    }

    #[test]
    fn test_force_disconnect_is_idempotent() {
        let mut machine = SessionStateMachine::new();
        assert_eq!(machine.force_disconnect(), None);
        machine.observe(true);
        assert_eq!(machine.force_disconnect(), Some(Transition::Disconnect));
        assert_eq!(machine.force_disconnect(), None);
    }

    #[test]
    fn test_alternating_observations_alternate_transitions() {
        let mut machine = SessionStateMachine::new();
        let transitions: Vec<_> = [true, false, true, false]
            .into_iter()
            .map(|present| machine.observe(present))
            .collect();
        assert_eq!(
            transitions,
            vec![
                Some(Transition::Connect),
                Some(Transition::Disconnect),
                Some(Transition::Connect),
                Some(Transition::Disconnect),
            ]
        );
    }
}
