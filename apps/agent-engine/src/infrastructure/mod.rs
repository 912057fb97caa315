//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer:
//!
//! - `persistence/`: decision stores (in-memory, JSON-lines journal)
//! - `venue/`: paper trading venue
//! - `market_data/`: snapshot replay
//! - `advisors/`: heuristic advisory providers and their registry
//! - `approval/`: channel-based human approval gateway

pub mod advisors;
pub mod approval;
pub mod market_data;
pub mod persistence;
pub mod venue;
