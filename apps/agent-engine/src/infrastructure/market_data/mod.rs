//! Market Data Adapters
//!
//! Implementations of [`crate::application::ports::MarketDataPort`].

mod replay;

pub use replay::{ReplayLoadError, ReplaySnapshotProvider};
