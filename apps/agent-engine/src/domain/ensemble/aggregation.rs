//! Vote aggregation with ordered fallback tiers.
//!
//! The first applicable tier wins:
//!
//! | Responders | Tier | Confidence |
//! |-----------:|------|------------|
//! | 0 | `QUORUM_FAILED` | HOLD at 0 |
//! | 1 of 1 enabled | `SINGLE_PASSTHROUGH` | unchanged |
//! | ≥ 3 | `WEIGHTED_VOTING` | 100 × winner score / Σ class scores |
//! | 2 | `MAJORITY_VOTE` | weighted mean on agreement, best × 0.7 otherwise |
//! | 1 of n | `SIMPLE_AVERAGE` | × (0.7 + 0.3 × 1/n), × 0.7 when below quorum |
//!
//! A class holding a strict majority of responders always wins weighted
//! voting. Otherwise ties fall to summed raw confidence, then vote count,
//! then the conservative order HOLD > SELL > BUY.
//!
//! Weighted-voting confidence measures agreement, not conviction: a
//! unanimous round scores 100 even when every provider voted at 10. Position
//! sizing therefore uses `Decision::sizing_confidence`, which caps it at the
//! winning voters' weighted mean confidence.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::EnsembleError;
use crate::domain::decision::{FallbackTier, ProviderVote, TradeAction};
use crate::domain::shared::ProviderId;

/// Confidence multiplier when two responders disagree.
pub const DISAGREEMENT_FACTOR: f64 = 0.7;
/// Flat penalty when a lone responder is below quorum.
pub const QUORUM_PENALTY: f64 = 0.7;
const DEGRADATION_BASE: f64 = 0.7;
const DEGRADATION_SPAN: f64 = 0.3;
const SCORE_EPSILON: f64 = 1e-9;

/// Result of aggregating one round of votes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    /// Winning action.
    pub action: TradeAction,
    /// Final confidence in `[0, 100]`.
    pub confidence: f64,
    /// Tier used.
    pub tier: FallbackTier,
    /// Fraction of responders that voted for `action`.
    pub agreement_score: f64,
    /// Fewer responders than the effective quorum.
    pub quorum_failed: bool,
}

/// Degradation factor applied to a lone responder.
#[must_use]
pub fn degradation_factor(active: usize, total: usize) -> f64 {
    if total == 0 {
        return DEGRADATION_BASE;
    }
    DEGRADATION_BASE + DEGRADATION_SPAN * (active as f64 / total as f64)
}

/// Aggregate `votes` with responder weights already renormalised.
///
/// `total_providers` is the number of enabled providers queried. Never
/// fails on missing responders; fails only on misconfiguration.
pub fn aggregate(
    votes: &[ProviderVote],
    weights: &BTreeMap<ProviderId, f64>,
    total_providers: usize,
    quorum: usize,
) -> Result<Aggregate, EnsembleError> {
    if quorum == 0 {
        return Err(EnsembleError::Misconfigured("quorum must be positive".to_string()));
    }
    if total_providers == 0 {
        return Err(EnsembleError::Misconfigured("no providers enabled".to_string()));
    }
    if votes.len() > total_providers {
        return Err(EnsembleError::Misconfigured(format!(
            "{} votes from {} providers",
            votes.len(),
            total_providers
        )));
    }

    let effective_quorum = quorum.min(total_providers);
    let quorum_failed = votes.len() < effective_quorum;

    let aggregate = match votes {
        [] => Aggregate {
            action: TradeAction::Hold,
            confidence: 0.0,
            tier: FallbackTier::QuorumFailed,
            agreement_score: 0.0,
            quorum_failed: true,
        },
        [only] if total_providers == 1 => Aggregate {
            action: only.action,
            confidence: only.confidence,
            tier: FallbackTier::SinglePassthrough,
            agreement_score: 1.0,
            quorum_failed: false,
        },
        [only] => {
            let penalty = if quorum_failed { QUORUM_PENALTY } else { 1.0 };
            Aggregate {
                action: only.action,
                confidence: only.confidence * degradation_factor(1, total_providers) * penalty,
                tier: FallbackTier::SimpleAverage,
                agreement_score: 1.0,
                quorum_failed,
            }
        }
        [first, second] => majority_vote(first, second, weights, quorum_failed)?,
        _ => weighted_vote(votes, weights, quorum_failed)?,
    };

    Ok(aggregate)
}

fn weight_of(weights: &BTreeMap<ProviderId, f64>, vote: &ProviderVote) -> Result<f64, EnsembleError> {
    weights
        .get(&vote.provider_id)
        .copied()
        .ok_or_else(|| EnsembleError::MissingWeight(vote.provider_id.clone()))
}

fn cmp_score(a: f64, b: f64) -> Ordering {
    if (a - b).abs() < SCORE_EPSILON {
        Ordering::Equal
    } else {
        a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    }
}

fn majority_vote(
    first: &ProviderVote,
    second: &ProviderVote,
    weights: &BTreeMap<ProviderId, f64>,
    quorum_failed: bool,
) -> Result<Aggregate, EnsembleError> {
    let w1 = weight_of(weights, first)?;
    let w2 = weight_of(weights, second)?;

    if first.action == second.action {
        let total = w1 + w2;
        let confidence = if total > 0.0 {
            (w1 * first.confidence + w2 * second.confidence) / total
        } else {
            f64::midpoint(first.confidence, second.confidence)
        };
        return Ok(Aggregate {
            action: first.action,
            confidence,
            tier: FallbackTier::MajorityVote,
            agreement_score: 1.0,
            quorum_failed,
        });
    }

    let ordering = cmp_score(first.confidence, second.confidence)
        .then_with(|| cmp_score(w1, w2))
        .then_with(|| first.action.conservatism().cmp(&second.action.conservatism()));
    let winner = if ordering == Ordering::Less { second } else { first };

    Ok(Aggregate {
        action: winner.action,
        confidence: winner.confidence * DISAGREEMENT_FACTOR,
        tier: FallbackTier::MajorityVote,
        agreement_score: 0.5,
        quorum_failed,
    })
}

#[derive(Debug, Default, Clone, Copy)]
struct ClassTally {
    score: f64,
    raw_confidence: f64,
    count: usize,
}

fn weighted_vote(
    votes: &[ProviderVote],
    weights: &BTreeMap<ProviderId, f64>,
    quorum_failed: bool,
) -> Result<Aggregate, EnsembleError> {
    let mut tallies: BTreeMap<TradeAction, ClassTally> = BTreeMap::new();
    for vote in votes {
        let weight = weight_of(weights, vote)?;
        let tally = tallies.entry(vote.action).or_default();
        tally.score += weight * vote.confidence;
        tally.raw_confidence += vote.confidence;
        tally.count += 1;
    }

    let responders = votes.len();
    let majority = tallies
        .iter()
        .find(|(_, tally)| tally.count * 2 > responders)
        .map(|(action, _)| *action);

    let winner = majority.or_else(|| {
        tallies
            .iter()
            .max_by(|(a_action, a), (b_action, b)| {
                cmp_score(a.score, b.score)
                    .then_with(|| cmp_score(a.raw_confidence, b.raw_confidence))
                    .then_with(|| a.count.cmp(&b.count))
                    .then_with(|| a_action.conservatism().cmp(&b_action.conservatism()))
            })
            .map(|(action, _)| *action)
    });
    let Some(action) = winner else {
        return Err(EnsembleError::Misconfigured("no votes to tally".to_string()));
    };

    let total_score: f64 = tallies.values().map(|t| t.score).sum();
    let winner_tally = tallies.get(&action).copied().unwrap_or_default();
    let confidence = if total_score > 0.0 {
        100.0 * winner_tally.score / total_score
    } else {
        0.0
    };

    Ok(Aggregate {
        action,
        confidence,
        tier: FallbackTier::WeightedVoting,
        agreement_score: winner_tally.count as f64 / responders as f64,
        quorum_failed,
    })
}
