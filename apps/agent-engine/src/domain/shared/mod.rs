//! Shared kernel: identifiers and market observations.

mod identifiers;
mod market;

pub use identifiers::{AssetId, CycleId, DecisionId, OrderId, ProviderId};
pub use market::{AssetClass, Candle, DAILY_TIMEFRAME, MarketSnapshot};

#[cfg(test)]
pub(crate) use market::fixtures;
