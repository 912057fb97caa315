//! Domain layer: pure types and rules, no I/O.
//!
//! - [`shared`]: identifiers and market snapshots
//! - [`decision`]: decisions, votes and the status lifecycle
//! - [`ensemble`]: vote aggregation and weight learning
//! - [`risk`]: portfolio view, limits and the gatekeeper
//! - [`agent`]: the agent state machine

pub mod agent;
pub mod decision;
pub mod ensemble;
pub mod risk;
pub mod shared;
