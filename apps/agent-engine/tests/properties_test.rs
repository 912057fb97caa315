//! Property tests for decision-core invariants.
//!
//! 1. Active weights renormalise to 1 for any failure subset
//! 2. Losing responders never raises confidence for identical votes
//! 3. Illegal agent transitions are refused and leave the state unchanged
//! 4. Risk validation is a pure function of decision, portfolio and time
//! 5. Weight learning keeps weights bounded and normalised
//! 6. Decision status never moves backwards

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use agent_engine::domain::agent::{AgentState, AgentStateMachine};
use agent_engine::domain::decision::{
    Decision, DecisionStatus, EnsembleMetadata, FallbackTier, ProviderVote, TradeAction,
    VoteRecord,
};
use agent_engine::domain::ensemble::{WeightAdjuster, aggregate, renormalize};
use agent_engine::domain::risk::{PortfolioState, Position, PositionSide, RiskGatekeeper};
use agent_engine::domain::shared::{AssetClass, AssetId, MarketSnapshot, ProviderId};

// ── Strategies ───────────────────────────────────────────────────────

fn arb_action() -> impl Strategy<Value = TradeAction> {
    prop::sample::select(TradeAction::ALL.to_vec())
}

fn arb_state() -> impl Strategy<Value = AgentState> {
    prop::sample::select(AgentState::ALL.to_vec())
}

fn arb_status() -> impl Strategy<Value = DecisionStatus> {
    prop::sample::select(vec![
        DecisionStatus::Proposed,
        DecisionStatus::RiskApproved,
        DecisionStatus::Executed,
        DecisionStatus::Failed,
        DecisionStatus::Rejected,
        DecisionStatus::Expired,
    ])
}

fn ids(n: usize) -> Vec<ProviderId> {
    (0..n).map(|i| ProviderId::new(format!("p{i}"))).collect()
}

fn empty_metadata() -> EnsembleMetadata {
    EnsembleMetadata {
        tier: FallbackTier::WeightedVoting,
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

fn snapshot(asset: &str, price: Decimal) -> MarketSnapshot {
    MarketSnapshot {
        asset: AssetId::new(asset),
        asset_class: AssetClass::Crypto,
        price,
        timestamp: Utc::now() - Duration::seconds(5),
        market_open: None,
        timeframes: BTreeMap::new(),
        indicators: BTreeMap::new(),
    }
}

// ── 1. Renormalisation ───────────────────────────────────────────────

proptest! {
    /// Whatever subset of providers answers, their weights sum to 1.
    #[test]
    fn renormalised_weights_sum_to_one(
        raw in prop::collection::vec(0.01..10.0_f64, 1..8),
        mask in prop::collection::vec(any::<bool>(), 8),
    ) {
        let providers = ids(raw.len());
        let weights: BTreeMap<ProviderId, f64> =
            providers.iter().cloned().zip(raw.iter().copied()).collect();
        let mut active: Vec<ProviderId> = providers
            .iter()
            .zip(&mask)
            .filter(|(_, on)| **on)
            .map(|(id, _)| id.clone())
            .collect();
        if active.is_empty() {
            active.push(providers[0].clone());
        }

        let renormalised = renormalize(&weights, &active).unwrap();
        prop_assert_eq!(renormalised.len(), active.len());
        prop_assert!((renormalised.values().sum::<f64>() - 1.0).abs() < 1e-9);
        prop_assert!(renormalised.values().all(|w| *w > 0.0 && *w <= 1.0));
    }
}

// ── 2. Monotonic degradation ─────────────────────────────────────────

proptest! {
    /// With every provider casting the same vote, dropping responders never
    /// raises the decision's confidence.
    #[test]
    fn fewer_responders_never_raise_confidence(
        action in arb_action(),
        confidence in 0.0..100.0_f64,
        raw in prop::collection::vec(0.01..10.0_f64, 3..6),
        responders in 1usize..3,
    ) {
        let providers = ids(raw.len());
        let weights: BTreeMap<ProviderId, f64> =
            providers.iter().cloned().zip(raw.iter().copied()).collect();
        let votes: Vec<ProviderVote> = providers
            .iter()
            .map(|id| ProviderVote::new(id.clone(), action, confidence, ""))
            .collect();

        let full_weights = renormalize(&weights, &providers).unwrap();
        let full = aggregate(&votes, &full_weights, providers.len(), 3).unwrap();

        let subset = &votes[..responders];
        let subset_ids: Vec<ProviderId> = subset.iter().map(|v| v.provider_id.clone()).collect();
        let subset_weights = renormalize(&weights, &subset_ids).unwrap();
        let degraded = aggregate(subset, &subset_weights, providers.len(), 3).unwrap();

        prop_assert_eq!(full.action, action);
        prop_assert_eq!(degraded.action, action);
        prop_assert!(degraded.quorum_failed);
        prop_assert!(degraded.confidence <= full.confidence + 1e-9);
    }
}

// ── 3. Transition fuzzing ────────────────────────────────────────────

proptest! {
    /// Any sequence of requests: legal ones move the machine, illegal ones
    /// fail and leave the last valid state in place.
    #[test]
    fn illegal_transitions_leave_state_unchanged(
        requests in prop::collection::vec(arb_state(), 1..40),
    ) {
        let mut machine = AgentStateMachine::new();
        for to in requests {
            let before = machine.current();
            let legal = AgentStateMachine::is_valid_transition(before, to);
            match machine.transition(to) {
                Ok(from) => {
                    prop_assert!(legal);
                    prop_assert_eq!(from, before);
                    prop_assert_eq!(machine.current(), to);
                }
                Err(err) => {
                    prop_assert!(!legal);
                    prop_assert_eq!(err.from, before);
                    prop_assert_eq!(err.to, to);
                    prop_assert_eq!(machine.current(), before);
                }
            }
        }
    }
}

// ── 4. Validation idempotence ────────────────────────────────────────

proptest! {
    /// Validating twice against an unchanged portfolio yields identical
    /// assessments.
    #[test]
    fn validate_is_idempotent(
        action in arb_action(),
        price in 1u32..100_000,
        size in prop::option::of(1u32..1_000),
        equity in 1_000u32..1_000_000,
        own_returns in prop::collection::vec(-0.1..0.1_f64, 0..60),
        other_returns in prop::collection::vec(-0.1..0.1_f64, 0..60),
        curve in prop::collection::vec(500.0..2_000_000.0_f64, 1..30),
        other_long in any::<bool>(),
    ) {
        let asset = AssetId::new("BTC-USD");
        let other = AssetId::new("ETH-USD");
        let mut decision = Decision::propose(
            &snapshot("BTC-USD", Decimal::from(price)),
            action,
            70.0,
            "property",
            empty_metadata(),
        );
        if action.is_trade() {
            decision.set_position_size(size.map(Decimal::from));
        }

        let portfolio = PortfolioState {
            equity: Decimal::from(equity),
            positions: vec![Position {
                asset: other.clone(),
                side: if other_long { PositionSide::Long } else { PositionSide::Short },
                quantity: Decimal::from(3),
                entry_price: Decimal::from(2_000),
                opened_at: Utc::now(),
                decision_id: None,
                attribution: Vec::new(),
            }],
            marks: BTreeMap::from([(asset.clone(), Decimal::from(price))]),
            equity_curve: curve,
            returns: BTreeMap::from([(asset, own_returns), (other, other_returns)]),
        };

        let gatekeeper = RiskGatekeeper::default();
        let now = Utc::now();
        let first = gatekeeper.validate(&decision, &portfolio, now);
        let second = gatekeeper.validate(&decision, &portfolio, now);

        prop_assert_eq!(&first, &second);
        prop_assert!(first.metrics.var_per_unit > 0.0 || !action.is_trade());
        prop_assert_eq!(first.approved, first.rejection.is_none());
    }
}

// ── 5. Weight learning ───────────────────────────────────────────────

proptest! {
    /// After any sequence of outcomes, weights stay normalised and positive.
    #[test]
    fn learning_keeps_weights_normalised(
        outcomes in prop::collection::vec(
            (arb_action(), -1_000.0..1_000.0_f64, prop::collection::vec(arb_action(), 3)),
            1..25,
        ),
    ) {
        let providers = ids(3);
        let mut weights: BTreeMap<ProviderId, f64> =
            providers.iter().map(|id| (id.clone(), 1.0 / 3.0)).collect();
        let adjuster = WeightAdjuster::default();

        for (executed, pnl, votes) in outcomes {
            let records: Vec<VoteRecord> = providers
                .iter()
                .zip(votes)
                .map(|(id, action)| VoteRecord {
                    provider_id: id.clone(),
                    action,
                    confidence: 50.0,
                    weight: 1.0 / 3.0,
                })
                .collect();
            adjuster.adjust(&mut weights, &records, executed, pnl).unwrap();

            prop_assert!((weights.values().sum::<f64>() - 1.0).abs() < 1e-9);
            prop_assert!(weights.values().all(|w| *w > 0.0));
        }
    }
}

// ── 6. Status monotonicity ───────────────────────────────────────────

proptest! {
    /// A refused status change leaves the decision's status as it was, and
    /// a terminal status never changes again.
    #[test]
    fn decision_status_never_reverts(
        requests in prop::collection::vec(arb_status(), 1..12),
    ) {
        let mut decision = Decision::propose(
            &snapshot("BTC-USD", Decimal::from(100)),
            TradeAction::Buy,
            60.0,
            "property",
            empty_metadata(),
        );
        for to in requests {
            let before = decision.status();
            let allowed = before.can_transition_to(to);
            let result = decision.advance(to);
            prop_assert_eq!(result.is_ok(), allowed);
            if allowed {
                prop_assert_eq!(decision.status(), to);
            } else {
                prop_assert_eq!(decision.status(), before);
            }
            if before.is_terminal() {
                prop_assert_eq!(decision.status(), before);
            }
        }
    }
}
