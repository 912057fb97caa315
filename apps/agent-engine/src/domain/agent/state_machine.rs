//! Agent State Machine
//!
//! One instance per agent. Every state change goes through
//! [`AgentStateMachine::transition`], which refuses anything outside the
//! table below and leaves the current state untouched when it does.
//!
//! | From | To |
//! |------|----|
//! | IDLE | RECOVERING, PERCEPTION |
//! | RECOVERING | IDLE, PERCEPTION |
//! | PERCEPTION | REASONING, IDLE |
//! | REASONING | RISK_CHECK, IDLE |
//! | RISK_CHECK | EXECUTION, IDLE |
//! | EXECUTION | LEARNING, IDLE |
//! | LEARNING | IDLE, PERCEPTION |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    /// Waiting for the next cycle.
    #[default]
    Idle,
    /// Rebuilding open positions from the venue.
    Recovering,
    /// Fetching the market snapshot.
    Perception,
    /// Querying the ensemble.
    Reasoning,
    /// Validating the decision against risk limits.
    RiskCheck,
    /// Submitting the decision to the venue.
    Execution,
    /// Updating positions, equity and provider weights.
    Learning,
}

impl AgentState {
    /// All states, in cycle order.
    pub const ALL: [Self; 7] = [
        Self::Idle,
        Self::Recovering,
        Self::Perception,
        Self::Reasoning,
        Self::RiskCheck,
        Self::Execution,
        Self::Learning,
    ];

    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Recovering => "RECOVERING",
            Self::Perception => "PERCEPTION",
            Self::Reasoning => "REASONING",
            Self::RiskCheck => "RISK_CHECK",
            Self::Execution => "EXECUTION",
            Self::Learning => "LEARNING",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition outside the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal agent transition {from} -> {to}")]
pub struct StateTransitionError {
    /// State at the time of the request.
    pub from: AgentState,
    /// Requested state.
    pub to: AgentState,
}

/// Holds the current [`AgentState`] and enforces the transition table.
#[derive(Debug, Clone, Default)]
pub struct AgentStateMachine {
    current: AgentState,
}

impl AgentStateMachine {
    /// Start in IDLE.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: AgentState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn current(&self) -> AgentState {
        self.current
    }

    /// Check if a state transition is valid.
    #[must_use]
    pub const fn is_valid_transition(from: AgentState, to: AgentState) -> bool {
        use AgentState::{Execution, Idle, Learning, Perception, Reasoning, Recovering, RiskCheck};
        matches!(
            (from, to),
            (Idle, Recovering | Perception)
                | (Recovering, Idle | Perception)
                | (Perception, Reasoning | Idle)
                | (Reasoning, RiskCheck | Idle)
                | (RiskCheck, Execution | Idle)
                | (Execution, Learning | Idle)
                | (Learning, Idle | Perception)
        )
    }

    /// Get all valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: AgentState) -> Vec<AgentState> {
        AgentState::ALL
            .into_iter()
            .filter(|to| Self::is_valid_transition(from, *to))
            .collect()
    }

    /// Move to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`StateTransitionError`] for a transition outside the table;
    /// the current state is unchanged.
    pub fn transition(&mut self, to: AgentState) -> Result<AgentState, StateTransitionError> {
        let from = self.current;
        if !Self::is_valid_transition(from, to) {
            return Err(StateTransitionError { from, to });
        }
        self.current = to;
        Ok(from)
    }

    /// Return to IDLE from anywhere except IDLE itself.
    ///
    /// Every non-idle state lists IDLE as a legal successor, so this is the
    /// abort path after a failed step.
    pub fn abort_to_idle(&mut self) -> Option<AgentState> {
        if self.current == AgentState::Idle {
            return None;
        }
        let from = self.current;
        self.current = AgentState::Idle;
        Some(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_happy_path_cycle() {
        let mut sm = AgentStateMachine::new();
        for to in [
            AgentState::Recovering,
            AgentState::Perception,
            AgentState::Reasoning,
            AgentState::RiskCheck,
            AgentState::Execution,
            AgentState::Learning,
            AgentState::Perception,
            AgentState::Idle,
        ] {
            sm.transition(to).unwrap();
        }
        assert_eq!(sm.current(), AgentState::Idle);
    }

    #[test]
    fn test_illegal_transition_keeps_state() {
        let mut sm = AgentStateMachine::new();
        sm.transition(AgentState::Perception).unwrap();
        let err = sm.transition(AgentState::Execution).unwrap_err();
        assert_eq!(err.from, AgentState::Perception);
        assert_eq!(err.to, AgentState::Execution);
        assert_eq!(sm.current(), AgentState::Perception);
    }

    #[test]
    fn test_idle_has_no_self_loop() {
        assert!(!AgentStateMachine::is_valid_transition(AgentState::Idle, AgentState::Idle));
        assert_eq!(
            AgentStateMachine::valid_next_states(AgentState::Idle),
            vec![AgentState::Recovering, AgentState::Perception]
        );
    }

    #[test]
    fn test_every_active_state_can_abort() {
        for state in AgentState::ALL.into_iter().skip(1) {
            assert!(AgentStateMachine::is_valid_transition(state, AgentState::Idle), "{state}");
        }
        let mut sm = AgentStateMachine::new();
        assert_eq!(sm.abort_to_idle(), None);
        sm.transition(AgentState::Perception).unwrap();
        assert_eq!(sm.abort_to_idle(), Some(AgentState::Perception));
    }

    fn any_state() -> impl Strategy<Value = AgentState> {
        prop::sample::select(AgentState::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_transitions_outside_table_never_change_state(
            path in prop::collection::vec(any_state(), 1..40)
        ) {
            let mut sm = AgentStateMachine::new();
            for to in path {
                let before = sm.current();
                match sm.transition(to) {
                    Ok(from) => {
                        prop_assert_eq!(from, before);
                        prop_assert!(AgentStateMachine::is_valid_transition(before, to));
                        prop_assert_eq!(sm.current(), to);
                    }
                    Err(err) => {
                        prop_assert!(!AgentStateMachine::is_valid_transition(before, to));
                        prop_assert_eq!(err.from, before);
                        prop_assert_eq!(sm.current(), before);
                    }
                }
            }
        }
    }
}
