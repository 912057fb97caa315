//! Agent orchestrator: drives the state machine through one cycle per call.

mod agent;
mod report;
mod shared;

pub use agent::AgentOrchestrator;
pub use report::{CycleOutcome, CycleReport};
pub use shared::{OrchestratorSettings, SharedResources};
