//! Query lifecycle states.
use std::fmt;

use bincode::{Decode, Encode};
use log::trace;

/// `Submitted → Running → {Finished, Failed, Exception, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Encode, Decode)]
pub enum QueryState {
    Submitted,
    Running,
    Finished,
    Failed,
    Exception,
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Finished | QueryState::Failed | QueryState::Exception | QueryState::Cancelled
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryState::Submitted => "SUBMITTED",
            QueryState::Running => "RUNNING",
            QueryState::Finished => "FINISHED",
            QueryState::Failed => "FAILED",
            QueryState::Exception => "EXCEPTION",
            QueryState::Cancelled => "CANCELLED",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            QueryState::Submitted => 0,
            QueryState::Running => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current state of one operation. Transitions only move forward and a terminal state
/// is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTracker {
    state: QueryState,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self {
            state: QueryState::Submitted,
        }
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Applies a reported state, returning the state now in effect. Reports that would
    /// move backwards, or away from a terminal state, are ignored.
    pub fn advance(&mut self, reported: QueryState) -> QueryState {
        if self.state.is_terminal() || reported.rank() < self.state.rank() {
            if reported != self.state {
                trace!("ignoring state {reported} after {}", self.state);
            }
            return self.state;
        }
        self.state = reported;
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions() {
        let mut tracker = StateTracker::new();
        assert_eq!(tracker.advance(QueryState::Running), QueryState::Running);
        assert_eq!(tracker.advance(QueryState::Finished), QueryState::Finished);
        assert!(tracker.is_terminal());
    }

    #[test]
    fn never_regresses() {
        let mut tracker = StateTracker::new();
        tracker.advance(QueryState::Running);
        assert_eq!(tracker.advance(QueryState::Submitted), QueryState::Running);
    }

    #[test]
    fn terminal_is_final() {
        let mut tracker = StateTracker::new();
        tracker.advance(QueryState::Exception);
        assert_eq!(tracker.advance(QueryState::Finished), QueryState::Exception);
        assert_eq!(tracker.advance(QueryState::Running), QueryState::Exception);
    }

    #[test]
    fn may_skip_running() {
        let mut tracker = StateTracker::new();
        assert_eq!(tracker.advance(QueryState::Cancelled), QueryState::Cancelled);
    }

    #[test]
    fn terminal_states() {
        assert!(!QueryState::Submitted.is_terminal());
        assert!(!QueryState::Running.is_terminal());
        for state in [
            QueryState::Finished,
            QueryState::Failed,
            QueryState::Exception,
            QueryState::Cancelled,
        ] {
            assert!(state.is_terminal(), "{state}");
        }
    }
}
