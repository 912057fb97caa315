//! Application Layer
//!
//! Orchestrates domain logic against the outside world:
//!
//! - **Ports**: async traits for every external collaborator
//! - **Services**: process-wide shared services
//! - **Orchestrator**: the per-asset agent cycle

pub mod orchestrator;
pub mod ports;
pub mod services;
