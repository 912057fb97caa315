//! Decisions, votes and their lifecycle.

#[allow(clippy::module_inception)]
mod decision;
mod vote;

pub use decision::{
    Decision, DecisionStatus, DecisionStatusError, EnsembleMetadata, FallbackTier, MarketContext,
};
pub use vote::{ProviderVote, TradeAction, VoteRecord};

#[cfg(test)]
pub(crate) use decision::fixtures;
