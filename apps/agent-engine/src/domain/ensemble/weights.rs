//! Provider weight renormalisation and outcome-driven adjustment.

use std::collections::BTreeMap;

use super::EnsembleError;
use crate::domain::decision::{TradeAction, VoteRecord};
use crate::domain::shared::ProviderId;

/// Rescale the weights of `active` providers so they sum to 1.
///
/// Inactive providers are dropped. Computed fresh per call; an empty
/// `active` set yields an empty map.
pub fn renormalize(
    weights: &BTreeMap<ProviderId, f64>,
    active: &[ProviderId],
) -> Result<BTreeMap<ProviderId, f64>, EnsembleError> {
    let mut selected = BTreeMap::new();
    for id in active {
        let weight = weights
            .get(id)
            .copied()
            .ok_or_else(|| EnsembleError::MissingWeight(id.clone()))?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(EnsembleError::Misconfigured(format!(
                "provider '{id}' has invalid weight {weight}"
            )));
        }
        selected.insert(id.clone(), weight);
    }

    if selected.is_empty() {
        return Ok(selected);
    }

    let total: f64 = selected.values().sum();
    if total <= 0.0 {
        return Err(EnsembleError::Misconfigured(
            "active provider weights sum to zero".to_string(),
        ));
    }
    for weight in selected.values_mut() {
        *weight /= total;
    }
    Ok(selected)
}

/// Normalise a full weight map so it sums to 1.
pub fn normalize_all(weights: &mut BTreeMap<ProviderId, f64>) -> Result<(), EnsembleError> {
    let ids: Vec<ProviderId> = weights.keys().cloned().collect();
    *weights = renormalize(weights, &ids)?;
    Ok(())
}

/// Multiplicative weight update from realised trade outcomes.
///
/// Providers whose vote matched the executed action gain weight on a
/// profitable close and lose it on a losing one; dissenters move the
/// opposite way. Weights stay within `[min_weight, max_weight]` and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightAdjuster {
    /// Step size per closed trade.
    pub learning_rate: f64,
    /// Lower bound per provider.
    pub min_weight: f64,
    /// Upper bound per provider.
    pub max_weight: f64,
}

impl Default for WeightAdjuster {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            min_weight: 0.05,
            max_weight: 0.8,
        }
    }
}

impl WeightAdjuster {
    /// Apply one outcome. Returns whether any weight changed.
    pub fn adjust(
        &self,
        weights: &mut BTreeMap<ProviderId, f64>,
        votes: &[VoteRecord],
        executed: TradeAction,
        realized_pnl: f64,
    ) -> Result<bool, EnsembleError> {
        if realized_pnl == 0.0 || !realized_pnl.is_finite() || self.learning_rate == 0.0 {
            return Ok(false);
        }
        let won = realized_pnl > 0.0;

        let mut changed = false;
        for vote in votes {
            let Some(weight) = weights.get_mut(&vote.provider_id) else {
                continue;
            };
            let agreed = vote.action == executed;
            let factor = if agreed == won {
                1.0 + self.learning_rate
            } else {
                1.0 - self.learning_rate
            };
            *weight *= factor;
            changed = true;
        }
        if !changed {
            return Ok(false);
        }

        normalize_all(weights)?;
        for weight in weights.values_mut() {
            *weight = weight.clamp(self.min_weight, self.max_weight);
        }
        normalize_all(weights)?;
        Ok(true)
    }
}
