//! The Decision aggregate and its forward-only status lifecycle.
//!
//! # Status Lifecycle
//!
//! ```text
//! PROPOSED ──→ RISK_APPROVED ──→ EXECUTED ──→ FAILED
//!    │              │
//!    │              ├──→ REJECTED (position limit, approval denied, kill switch)
//!    │              ├──→ EXPIRED  (approval timeout)
//!    │              └──→ FAILED   (venue error)
//!    ├──→ REJECTED (risk check failed, kill switch)
//!    └──→ FAILED   (cycle aborted)
//! ```
//!
//! FAILED, REJECTED and EXPIRED are terminal. A status never moves backwards.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::vote::{TradeAction, VoteRecord};
use crate::domain::risk::RiskAssessment;
use crate::domain::shared::{AssetClass, AssetId, DecisionId, MarketSnapshot, ProviderId};

/// Aggregation strategy that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallbackTier {
    /// Three or more responders, weighted class scores.
    WeightedVoting,
    /// Exactly two responders.
    MajorityVote,
    /// One responder out of several enabled.
    SimpleAverage,
    /// Only one provider enabled.
    SinglePassthrough,
    /// Nobody responded.
    QuorumFailed,
}

impl FallbackTier {
    /// Stable label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedVoting => "WEIGHTED_VOTING",
            Self::MajorityVote => "MAJORITY_VOTE",
            Self::SimpleAverage => "SIMPLE_AVERAGE",
            Self::SinglePassthrough => "SINGLE_PASSTHROUGH",
            Self::QuorumFailed => "QUORUM_FAILED",
        }
    }
}

impl fmt::Display for FallbackTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of an ensemble decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMetadata {
    /// Tier that produced the decision.
    pub tier: FallbackTier,
    /// Providers that returned a vote.
    pub active_providers: usize,
    /// Providers that were queried.
    pub total_providers: usize,
    /// Configured quorum.
    pub quorum: usize,
    /// Renormalised weights of the responders.
    pub weights: BTreeMap<ProviderId, f64>,
    /// Fraction of responders that voted for the winning action.
    pub agreement_score: f64,
    /// Fewer responders than the effective quorum.
    pub quorum_failed: bool,
    /// Providers that timed out, errored or were short-circuited.
    pub failed_providers: Vec<ProviderId>,
    /// Votes received, for learning attribution.
    pub votes: Vec<VoteRecord>,
}

/// Lifecycle status of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    /// Produced by the ensemble.
    Proposed,
    /// Passed every risk check.
    RiskApproved,
    /// Filled by the venue.
    Executed,
    /// Aborted or failed at the venue.
    Failed,
    /// Refused by risk, position limit, approval or kill switch.
    Rejected,
    /// Approval timed out.
    Expired,
}

impl DecisionStatus {
    /// Whether `self → to` is a legal forward transition.
    #[must_use]
    pub const fn can_transition_to(&self, to: Self) -> bool {
        matches!(
            (*self, to),
            (Self::Proposed, Self::RiskApproved | Self::Rejected | Self::Failed)
                | (
                    Self::RiskApproved,
                    Self::Executed | Self::Rejected | Self::Expired | Self::Failed
                )
                | (Self::Executed, Self::Failed)
        )
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Rejected | Self::Expired)
    }

    /// Stable label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "PROPOSED",
            Self::RiskApproved => "RISK_APPROVED",
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refused status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decision {id}: illegal status change {from} -> {to}")]
pub struct DecisionStatusError {
    /// Decision id.
    pub id: DecisionId,
    /// Current status.
    pub from: DecisionStatus,
    /// Requested status.
    pub to: DecisionStatus,
}

/// Market facts captured when the decision was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    /// Asset class of the decided asset.
    pub asset_class: AssetClass,
    /// Snapshot observation time.
    pub observed_at: DateTime<Utc>,
    /// Whether the market was open, when known.
    pub market_open: Option<bool>,
}

impl From<&MarketSnapshot> for MarketContext {
    fn from(snapshot: &MarketSnapshot) -> Self {
        Self {
            asset_class: snapshot.asset_class,
            observed_at: snapshot.timestamp,
            market_open: snapshot.market_open,
        }
    }
}

/// The system's single output per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique id, also the venue idempotency key.
    pub id: DecisionId,
    /// Decided asset.
    pub asset: AssetId,
    /// Decided action.
    pub action: TradeAction,
    /// Final confidence in `[0, 100]`.
    pub confidence: f64,
    /// Quantity to trade; `None` means signal-only.
    pub recommended_position_size: Option<Decimal>,
    /// Price the decision was made at.
    pub reference_price: Decimal,
    /// Aggregated rationale.
    pub reasoning: String,
    /// Ensemble provenance.
    pub ensemble_metadata: EnsembleMetadata,
    /// Market facts at decision time.
    pub market: MarketContext,
    /// Latest risk assessment.
    pub risk_context: Option<RiskAssessment>,
    status: DecisionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last status change.
    pub updated_at: DateTime<Utc>,
}

impl Decision {
    /// Create a PROPOSED, signal-only decision.
    #[must_use]
    pub fn propose(
        snapshot: &MarketSnapshot,
        action: TradeAction,
        confidence: f64,
        reasoning: impl Into<String>,
        ensemble_metadata: EnsembleMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DecisionId::generate(),
            asset: snapshot.asset.clone(),
            action,
            confidence,
            recommended_position_size: None,
            reference_price: snapshot.price,
            reasoning: reasoning.into(),
            ensemble_metadata,
            market: MarketContext::from(snapshot),
            risk_context: None,
            status: DecisionStatus::Proposed,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> DecisionStatus {
        self.status
    }

    /// Whether the decision carries no sizing.
    #[must_use]
    pub const fn is_signal_only(&self) -> bool {
        self.recommended_position_size.is_none()
    }

    /// Confidence used for position sizing.
    ///
    /// Ensemble confidence measures agreement, so a unanimous round scores
    /// 100 however unsure each provider was. Sizing takes the lower of that
    /// and the weight-averaged confidence of the providers that voted for the
    /// action.
    #[must_use]
    pub fn sizing_confidence(&self) -> f64 {
        let (weighted, weight) = self
            .ensemble_metadata
            .votes
            .iter()
            .filter(|v| v.action == self.action)
            .fold((0.0, 0.0), |(sum, total), v| {
                (sum + v.weight * v.confidence, total + v.weight)
            });
        if weight > 0.0 {
            self.confidence.min(weighted / weight)
        } else {
            self.confidence
        }
    }

    /// Notional value of the recommended size at the reference price.
    #[must_use]
    pub fn notional(&self) -> Option<Decimal> {
        self.recommended_position_size
            .map(|size| size * self.reference_price)
    }

    /// Set the recommended size (a zero size is treated as signal-only).
    pub fn set_position_size(&mut self, size: Option<Decimal>) {
        self.recommended_position_size = size.filter(|s| *s > Decimal::ZERO);
    }

    /// Attach a fresh risk assessment.
    pub fn attach_risk(&mut self, assessment: RiskAssessment) {
        self.risk_context = Some(assessment);
    }

    /// Advance the status; illegal changes leave the status untouched.
    pub fn advance(&mut self, to: DecisionStatus) -> Result<(), DecisionStatusError> {
        if !self.status.can_transition_to(to) {
            return Err(DecisionStatusError {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Metadata for a decision with the given tier and no votes.
    pub fn metadata(tier: FallbackTier) -> EnsembleMetadata {
        EnsembleMetadata {
            tier,
            active_providers: 3,
            total_providers: 3,
            quorum: 3,
            weights: BTreeMap::new(),
            agreement_score: 1.0,
            quorum_failed: false,
            failed_providers: Vec::new(),
            votes: Vec::new(),
        }
    }

    /// A sized PROPOSED decision for `snapshot`.
    pub fn sized_decision(
        snapshot: &MarketSnapshot,
        action: TradeAction,
        size: Option<Decimal>,
    ) -> Decision {
        let mut decision = Decision::propose(
            snapshot,
            action,
            70.0,
            "fixture",
            metadata(FallbackTier::WeightedVoting),
        );
        decision.set_position_size(size);
        decision
    }
}
