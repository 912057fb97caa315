//! Ensemble aggregation: tiers, weight renormalisation and learning.

mod aggregation;
mod weights;

use thiserror::Error;

use crate::domain::shared::ProviderId;

pub use aggregation::{
    Aggregate, DISAGREEMENT_FACTOR, QUORUM_PENALTY, aggregate, degradation_factor,
};
pub use weights::{WeightAdjuster, normalize_all, renormalize};

/// Fatal ensemble misconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnsembleError {
    /// Quorum, provider set or weights are invalid.
    #[error("ensemble misconfigured: {0}")]
    Misconfigured(String),
    /// A responding provider has no configured weight.
    #[error("no weight configured for provider '{0}'")]
    MissingWeight(ProviderId),
}
