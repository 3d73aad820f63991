//! Launch lifecycle state machine
//!
//! `NotStarted -> ServerLaunching -> ServerLaunched -> TunnelLaunching ->
//! TunnelLaunched -> Waiting -> (Interrupted | ChildExited)`

use relay_core::{RelayError, Result};
use std::fmt;
use std::time::Instant;
use tracing::debug;

/// Where a launch session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    NotStarted,
    ServerLaunching,
    ServerLaunched,
    TunnelLaunching,
    TunnelLaunched,
    Waiting,
    Interrupted,
    ChildExited,
}

impl LaunchState {
    /// Whether `next` directly follows `self`
    pub fn can_transition_to(self, next: LaunchState) -> bool {
        use LaunchState::{
            ChildExited, Interrupted, NotStarted, ServerLaunched, ServerLaunching,
            TunnelLaunched, TunnelLaunching, Waiting,
        };

        matches!(
            (self, next),
            (NotStarted, ServerLaunching)
                | (ServerLaunching, ServerLaunched)
                | (ServerLaunched, TunnelLaunching)
                | (TunnelLaunching, TunnelLaunched)
                | (TunnelLaunched, Waiting)
                | (Waiting, Interrupted | ChildExited)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Interrupted | Self::ChildExited)
    }
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NotStarted",
            Self::ServerLaunching => "ServerLaunching",
            Self::ServerLaunched => "ServerLaunched",
            Self::TunnelLaunching => "TunnelLaunching",
            Self::TunnelLaunched => "TunnelLaunched",
            Self::Waiting => "Waiting",
            Self::Interrupted => "Interrupted",
            Self::ChildExited => "ChildExited",
        };
        f.write_str(name)
    }
}

/// Records transitions and rejects illegal ones
#[derive(Debug, Clone)]
pub struct StateTracker {
    current: LaunchState,
    history: Vec<(LaunchState, Instant)>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            current: LaunchState::NotStarted,
            history: vec![(LaunchState::NotStarted, Instant::now())],
        }
    }

    pub fn current(&self) -> LaunchState {
        self.current
    }

    pub fn history(&self) -> &[(LaunchState, Instant)] {
        &self.history
    }

    /// Move to `next`, failing on an illegal transition
    pub fn advance(&mut self, next: LaunchState) -> Result<()> {
        if !self.current.can_transition_to(next) {
            return Err(RelayError::InvalidTransition {
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }

        debug!("Launch state: {} -> {}", self.current, next);
        self.current = next;
        self.history.push((next, Instant::now()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_path() {
        let mut tracker = StateTracker::new();
        for next in [
            LaunchState::ServerLaunching,
            LaunchState::ServerLaunched,
            LaunchState::TunnelLaunching,
            LaunchState::TunnelLaunched,
            LaunchState::Waiting,
            LaunchState::ChildExited,
        ] {
            tracker.advance(next).unwrap();
        }

        assert!(tracker.current().is_terminal());
        assert_eq!(tracker.history().len(), 7);
    }

    #[test]
    fn test_tunnel_cannot_precede_server() {
        let mut tracker = StateTracker::new();
        let err = tracker.advance(LaunchState::TunnelLaunching).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid lifecycle transition: NotStarted -> TunnelLaunching"
        );
        assert_eq!(tracker.current(), LaunchState::NotStarted);
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert!(!LaunchState::Interrupted.can_transition_to(LaunchState::Waiting));
        assert!(!LaunchState::ChildExited.can_transition_to(LaunchState::Interrupted));
        assert!(LaunchState::Waiting.can_transition_to(LaunchState::Interrupted));
    }
}
