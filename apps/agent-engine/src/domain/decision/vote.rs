//! Trade actions and advisory votes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::shared::ProviderId;

/// Action recommended for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    /// Go long, or cover a short.
    Buy,
    /// Go short, or close a long.
    Sell,
    /// Do nothing.
    Hold,
}

impl TradeAction {
    /// All actions, in declaration order.
    pub const ALL: [Self; 3] = [Self::Buy, Self::Sell, Self::Hold];

    /// Stable label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }

    /// Rank used as the last tie-breaker, higher is more conservative.
    #[must_use]
    pub const fn conservatism(&self) -> u8 {
        match self {
            Self::Hold => 2,
            Self::Sell => 1,
            Self::Buy => 0,
        }
    }

    /// Whether the action trades.
    #[must_use]
    pub const fn is_trade(&self) -> bool {
        !matches!(self, Self::Hold)
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One advisory opinion, produced per call and discarded after aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderVote {
    /// Provider that voted.
    pub provider_id: ProviderId,
    /// Recommended action.
    pub action: TradeAction,
    /// Confidence in `[0, 100]`.
    pub confidence: f64,
    /// Free-form rationale.
    pub reasoning: String,
    /// Time the provider took to answer.
    pub latency: Duration,
}

impl ProviderVote {
    /// Create a vote, clamping confidence into `[0, 100]`.
    ///
    /// Non-finite confidence becomes 0.
    #[must_use]
    pub fn new(
        provider_id: ProviderId,
        action: TradeAction,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            provider_id,
            action,
            confidence,
            reasoning: reasoning.into(),
            latency: Duration::ZERO,
        }
    }

    /// Set the measured latency.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// A vote as recorded in decision metadata for learning attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Provider that voted.
    pub provider_id: ProviderId,
    /// Action voted for.
    pub action: TradeAction,
    /// Confidence of the vote.
    pub confidence: f64,
    /// Renormalised weight the vote carried.
    pub weight: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        let id = ProviderId::new("p");
        assert_eq!(ProviderVote::new(id.clone(), TradeAction::Buy, 140.0, "").confidence, 100.0);
        assert_eq!(ProviderVote::new(id.clone(), TradeAction::Buy, -3.0, "").confidence, 0.0);
        assert_eq!(ProviderVote::new(id, TradeAction::Buy, f64::NAN, "").confidence, 0.0);
    }

    #[test]
    fn test_conservative_order() {
        assert!(TradeAction::Hold.conservatism() > TradeAction::Sell.conservatism());
        assert!(TradeAction::Sell.conservatism() > TradeAction::Buy.conservatism());
    }

    #[test]
    fn test_action_serializes_screaming_case() {
        assert_eq!(serde_json::to_string(&TradeAction::Hold).unwrap(), "\"HOLD\"");
    }
}
