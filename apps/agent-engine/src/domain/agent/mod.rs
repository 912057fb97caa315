//! Agent lifecycle state machine.

mod state_machine;

pub use state_machine::{AgentState, AgentStateMachine, StateTransitionError};
