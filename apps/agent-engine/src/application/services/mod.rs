//! Application Services
//!
//! Process-wide services shared by every orchestrator: the ensemble
//! engine, the position ledger, the kill switch, the portfolio tracker and
//! the provider weight book.

mod ensemble_engine;
mod kill_switch;
mod portfolio_tracker;
mod position_ledger;
mod sizing;
mod weight_book;

pub use ensemble_engine::EnsembleEngine;
pub use kill_switch::{KillSwitch, KillSwitchReason, KillSwitchThresholds, KillSwitchTrip};
pub use portfolio_tracker::PortfolioTracker;
pub use position_ledger::{PositionLedger, PositionLimitError, Reservation};
pub use sizing::PositionSizer;
pub use weight_book::ProviderWeightBook;
