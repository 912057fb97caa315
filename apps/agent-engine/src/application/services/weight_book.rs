//! Process-wide provider weights.
//!
//! Read by every ensemble round, written only by LEARNING. One lock guards
//! the whole map so a round never sees a half-applied update.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::domain::ensemble::{EnsembleError, WeightAdjuster, normalize_all};
use crate::domain::risk::{TradeOutcome, to_f64};
use crate::domain::shared::ProviderId;

/// Shared, learnable provider weights.
#[derive(Debug)]
pub struct ProviderWeightBook {
    weights: RwLock<BTreeMap<ProviderId, f64>>,
    adjuster: WeightAdjuster,
}

impl ProviderWeightBook {
    /// Create a book from configured weights, normalised to sum to 1.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::Misconfigured`] when a weight is negative,
    /// non-finite or all weights are zero.
    pub fn new(
        mut initial: BTreeMap<ProviderId, f64>,
        adjuster: WeightAdjuster,
    ) -> Result<Self, EnsembleError> {
        normalize_all(&mut initial)?;
        Ok(Self {
            weights: RwLock::new(initial),
            adjuster,
        })
    }

    /// Copy of the current weights.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<ProviderId, f64> {
        self.weights
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current weight of one provider.
    #[must_use]
    pub fn weight(&self, id: &ProviderId) -> Option<f64> {
        self.weights
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
    }

    /// Attribute a closed trade to the providers that voted on its opening.
    ///
    /// Returns whether any weight changed.
    pub fn apply_outcome(&self, outcome: &TradeOutcome) -> Result<bool, EnsembleError> {
        let pnl = to_f64(outcome.realized_pnl);
        let mut weights = self.weights.write().unwrap_or_else(PoisonError::into_inner);
        let changed =
            self.adjuster
                .adjust(&mut weights, &outcome.attribution, outcome.opening_action(), pnl)?;
        if changed {
            tracing::info!(
                asset = %outcome.asset,
                realized_pnl = pnl,
                weights = ?*weights,
                "Provider weights updated"
            );
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::{TradeAction, VoteRecord};
    use crate::domain::risk::{Position, PositionSide};
    use crate::domain::shared::{AssetId, DecisionId};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn book() -> ProviderWeightBook {
        let initial = ["a", "b"]
            .into_iter()
            .map(|id| (ProviderId::new(id), 2.0))
            .collect();
        ProviderWeightBook::new(initial, WeightAdjuster::default()).unwrap()
    }

    fn outcome(exit: rust_decimal::Decimal) -> TradeOutcome {
        let position = Position {
            asset: AssetId::new("BTC-USD"),
            side: PositionSide::Long,
            quantity: dec!(1),
            entry_price: dec!(100),
            opened_at: Utc::now(),
            decision_id: Some(DecisionId::new("open")),
            attribution: vec![
                VoteRecord {
                    provider_id: ProviderId::new("a"),
                    action: TradeAction::Buy,
                    confidence: 80.0,
                    weight: 0.5,
                },
                VoteRecord {
                    provider_id: ProviderId::new("b"),
                    action: TradeAction::Sell,
                    confidence: 60.0,
                    weight: 0.5,
                },
            ],
        };
        TradeOutcome::close(position, DecisionId::new("close"), exit)
    }

    #[test]
    fn test_initial_weights_are_normalised() {
        let book = book();
        assert_eq!(book.weight(&ProviderId::new("a")), Some(0.5));
    }

    #[test]
    fn test_winning_trade_rewards_agreeing_provider() {
        let book = book();
        assert!(book.apply_outcome(&outcome(dec!(110))).unwrap());
        let weights = book.snapshot();
        assert!(weights[&ProviderId::new("a")] > weights[&ProviderId::new("b")]);
        assert!((weights.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_losing_trade_rewards_dissenter() {
        let book = book();
        book.apply_outcome(&outcome(dec!(90))).unwrap();
        let weights = book.snapshot();
        assert!(weights[&ProviderId::new("b")] > weights[&ProviderId::new("a")]);
    }

    #[test]
    fn test_flat_trade_changes_nothing() {
        let book = book();
        assert!(!book.apply_outcome(&outcome(dec!(100))).unwrap());
    }
}
