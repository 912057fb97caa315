//! Application Ports (Driven)
//!
//! Ports define the interfaces the agent uses to reach external systems.
//! Infrastructure adapters implement them; tests substitute fakes.

mod advisory_port;
mod approval_port;
mod decision_store_port;
mod market_data_port;
mod venue_port;

pub use advisory_port::{AdvisoryContext, AdvisoryError, AdvisoryProvider};
pub use approval_port::{ApprovalError, ApprovalPort, ApprovalVerdict};
pub use decision_store_port::{DecisionStore, PersistenceError};
pub use market_data_port::{MarketDataError, MarketDataPort};
pub use venue_port::{AccountSnapshot, ExecutionReport, VenueError, VenuePort};
