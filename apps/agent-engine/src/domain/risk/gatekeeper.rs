//! Risk gatekeeper: validates a decision against portfolio limits.
//!
//! Every metric is computed up front, then checks run in
//! [`RiskCheckKind::ORDER`]. The first failure rejects the decision and the
//! remaining applicable checks are marked `NOT_EVALUATED`. Which checks
//! apply depends on the decision's [`TradeIntent`]:
//!
//! | Intent | Freshness | Drawdown | VaR | Correlation | Concentration | Leverage |
//! |--------|:-:|:-:|:-:|:-:|:-:|:-:|
//! | `OPEN` | ✓ | ✓ | ✓ | ✓ | ✓ | ✓ |
//! | `SIGNAL_ONLY` | ✓ | ✓ | – | ✓ | – | – |
//! | `REDUCE` | ✓ | – | – | – | – | – |
//! | `HOLD` | ✓ | – | – | – | – | – |
//!
//! Validation is pure: the same decision and portfolio at the same instant
//! always yield the same assessment.

use chrono::{DateTime, Utc};

use super::assessment::{
    CheckStatus, RiskAssessment, RiskCheck, RiskCheckKind, RiskMetrics, TradeIntent, VarMethod,
};
use super::limits::RiskLimits;
use super::portfolio::{PortfolioState, to_f64};
use super::statistics::{
    current_drawdown, inverse_normal_cdf, max_drawdown, pearson_correlation, sample_std_dev,
};
use crate::domain::decision::{Decision, TradeAction};
use crate::domain::shared::AssetId;

/// Overlapping returns required before a correlation is trusted.
pub const MIN_CORRELATION_POINTS: usize = 10;

/// Validates decisions against [`RiskLimits`].
#[derive(Debug, Clone, Default)]
pub struct RiskGatekeeper {
    limits: RiskLimits,
}

impl RiskGatekeeper {
    /// Create a gatekeeper.
    #[must_use]
    pub const fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    /// Configured limits.
    #[must_use]
    pub const fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Classify how `decision` changes exposure.
    #[must_use]
    pub fn intent(decision: &Decision, portfolio: &PortfolioState) -> TradeIntent {
        if decision.action == TradeAction::Hold {
            return TradeIntent::Hold;
        }
        if portfolio
            .position(&decision.asset)
            .is_some_and(|p| p.is_closed_by(decision.action))
        {
            return TradeIntent::Reduce;
        }
        if decision.is_signal_only() {
            TradeIntent::SignalOnly
        } else {
            TradeIntent::Open
        }
    }

    /// Validate `decision` against `portfolio` at `now`.
    #[must_use]
    pub fn validate(
        &self,
        decision: &Decision,
        portfolio: &PortfolioState,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let intent = Self::intent(decision, portfolio);
        let metrics = self.compute_metrics(decision, portfolio, intent, now);
        let staleness = self.limits.profile(decision.market.asset_class).staleness;
        let market_closed = decision.market.market_open == Some(false);

        let mut checks = Vec::with_capacity(RiskCheckKind::ORDER.len());
        let mut rejection = None;

        for kind in RiskCheckKind::ORDER {
            let (value, limit) = match kind {
                RiskCheckKind::Freshness => {
                    (metrics.snapshot_age_secs, staleness.as_secs_f64())
                }
                RiskCheckKind::Drawdown => {
                    (metrics.current_drawdown_pct, self.limits.max_drawdown_pct)
                }
                RiskCheckKind::ValueAtRisk => (metrics.var_pct, self.limits.max_var_pct),
                RiskCheckKind::Correlation => (
                    metrics.max_correlation.unwrap_or(0.0),
                    self.limits.max_correlation,
                ),
                RiskCheckKind::Concentration => {
                    (metrics.concentration_pct, self.limits.max_concentration_pct)
                }
                RiskCheckKind::Leverage => (metrics.leverage, self.limits.max_leverage),
            };

            let status = if !applies(intent, kind) {
                CheckStatus::Skipped
            } else if rejection.is_some() {
                CheckStatus::NotEvaluated
            } else {
                let breached = value > limit
                    || (kind == RiskCheckKind::Freshness && market_closed);
                if breached {
                    rejection = Some(kind);
                    CheckStatus::Failed
                } else {
                    CheckStatus::Passed
                }
            };

            checks.push(RiskCheck {
                kind,
                status,
                value,
                limit,
            });
        }

        RiskAssessment {
            approved: rejection.is_none(),
            intent,
            metrics,
            checks,
            rejection,
            evaluated_at: now,
        }
    }

    fn compute_metrics(
        &self,
        decision: &Decision,
        portfolio: &PortfolioState,
        intent: TradeIntent,
        now: DateTime<Utc>,
    ) -> RiskMetrics {
        let profile = self.limits.profile(decision.market.asset_class);
        let snapshot_age_secs = (now - decision.market.observed_at)
            .to_std()
            .map_or(0.0, |d| d.as_secs_f64());

        let returns = portfolio.returns_of(&decision.asset);
        let sample = sample_std_dev(returns).filter(|s| s.is_finite() && *s > 0.0);
        let (volatility, var_method) = match sample {
            Some(sigma) if returns.len() >= self.limits.min_history => {
                (sigma, VarMethod::Historical)
            }
            _ => (
                sample.unwrap_or(0.0).max(profile.default_volatility),
                VarMethod::Bootstrap,
            ),
        };
        let var_per_unit = inverse_normal_cdf(self.limits.var_confidence) * volatility;

        let direction = direction_of(decision.action);
        let proposed_notional = match intent {
            TradeIntent::Open | TradeIntent::Reduce => {
                decision.notional().map_or(0.0, to_f64)
            }
            TradeIntent::SignalOnly | TradeIntent::Hold => 0.0,
        };
        let existing = portfolio.exposure_to(&decision.asset);
        let post_trade = existing + direction * proposed_notional;

        let equity = portfolio.equity_f64();
        let var_amount = var_per_unit * post_trade.abs();
        let gross_after = portfolio.gross_exposure() - existing.abs() + post_trade.abs();

        let (max_correlation, correlated_with) =
            directional_correlation(&decision.asset, direction, portfolio);

        RiskMetrics {
            snapshot_age_secs,
            current_drawdown_pct: current_drawdown(&portfolio.equity_curve),
            max_drawdown_pct: max_drawdown(&portfolio.equity_curve),
            volatility,
            history_len: returns.len(),
            var_method,
            var_per_unit,
            var_amount,
            var_pct: ratio(var_amount, equity),
            max_correlation,
            correlated_with,
            concentration_pct: ratio(post_trade.abs(), equity),
            leverage: ratio(gross_after, equity),
            proposed_notional,
        }
    }
}

const fn applies(intent: TradeIntent, kind: RiskCheckKind) -> bool {
    match intent {
        TradeIntent::Open => true,
        TradeIntent::SignalOnly => matches!(
            kind,
            RiskCheckKind::Freshness | RiskCheckKind::Drawdown | RiskCheckKind::Correlation
        ),
        TradeIntent::Reduce | TradeIntent::Hold => matches!(kind, RiskCheckKind::Freshness),
    }
}

const fn direction_of(action: TradeAction) -> f64 {
    match action {
        TradeAction::Buy => 1.0,
        TradeAction::Sell => -1.0,
        TradeAction::Hold => 0.0,
    }
}

fn ratio(numerator: f64, equity: f64) -> f64 {
    if numerator == 0.0 {
        0.0
    } else if equity > 0.0 {
        numerator / equity
    } else {
        f64::MAX
    }
}

/// Highest correlation weighted by the direction of both legs.
fn directional_correlation(
    asset: &AssetId,
    direction: f64,
    portfolio: &PortfolioState,
) -> (Option<f64>, Option<AssetId>) {
    if direction == 0.0 {
        return (None, None);
    }
    let own = portfolio.returns_of(asset);
    portfolio
        .positions
        .iter()
        .filter(|p| &p.asset != asset)
        .filter_map(|p| {
            pearson_correlation(own, portfolio.returns_of(&p.asset), MIN_CORRELATION_POINTS)
                .map(|rho| (rho * direction * p.side.sign(), p.asset.clone()))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map_or((None, None), |(rho, with)| (Some(rho), Some(with)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::fixtures::sized_decision;
    use crate::domain::risk::portfolio::{Position, PositionSide};
    use crate::domain::shared::AssetClass;
    use crate::domain::shared::fixtures::snapshot_with_closes;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use test_case::test_case;

    fn portfolio(equity: Decimal) -> PortfolioState {
        PortfolioState {
            equity,
            equity_curve: vec![to_f64(equity)],
            ..PortfolioState::default()
        }
    }

    fn buy(size: Option<Decimal>, observed_at: DateTime<Utc>) -> Decision {
        let snap = snapshot_with_closes("BTC-USD", AssetClass::Crypto, dec!(100), observed_at, &[]);
        sized_decision(&snap, TradeAction::Buy, size)
    }

    fn open_position(asset: &str, side: PositionSide) -> Position {
        Position {
            asset: AssetId::new(asset),
            side,
            quantity: dec!(10),
            entry_price: dec!(100),
            opened_at: Utc::now(),
            decision_id: None,
            attribution: Vec::new(),
        }
    }

    fn trending_returns(n: usize, scale: f64) -> Vec<f64> {
        (0..n).map(|i| scale * ((i % 5) as f64 - 2.0) / 100.0).collect()
    }

    #[test]
    fn test_small_fresh_trade_is_approved() {
        let now = Utc::now();
        let gk = RiskGatekeeper::default();
        let assessment = gk.validate(&buy(Some(dec!(10)), now), &portfolio(dec!(100000)), now);
        assert!(assessment.approved, "{assessment:?}");
        assert_eq!(assessment.intent, TradeIntent::Open);
        assert!(assessment.checks.iter().all(|c| c.status == CheckStatus::Passed));
    }

    #[test]
    fn test_stale_snapshot_rejected_and_short_circuits() {
        let now = Utc::now();
        let gk = RiskGatekeeper::default();
        let decision = buy(Some(dec!(10)), now - chrono::Duration::seconds(600));
        let assessment = gk.validate(&decision, &portfolio(dec!(100000)), now);
        assert!(!assessment.approved);
        assert_eq!(assessment.rejection, Some(RiskCheckKind::Freshness));
        assert_eq!(assessment.status_of(RiskCheckKind::Drawdown), CheckStatus::NotEvaluated);
        assert_eq!(assessment.status_of(RiskCheckKind::Leverage), CheckStatus::NotEvaluated);
        assert!(assessment.metrics.snapshot_age_secs >= 600.0);
        assert!(assessment.metrics.var_per_unit > 0.0);
    }

    #[test_case(AssetClass::Crypto, 121, false ; "crypto over two minutes")]
    #[test_case(AssetClass::Crypto, 60, true ; "crypto one minute")]
    #[test_case(AssetClass::Equity, 600, true ; "equity ten minutes")]
    #[test_case(AssetClass::Equity, 901, false ; "equity over fifteen minutes")]
    fn test_staleness_threshold_by_asset_class(class: AssetClass, age_secs: i64, fresh: bool) {
        let now = Utc::now();
        let snap = snapshot_with_closes(
            "X",
            class,
            dec!(100),
            now - chrono::Duration::seconds(age_secs),
            &[],
        );
        let decision = sized_decision(&snap, TradeAction::Buy, Some(dec!(1)));
        let assessment = RiskGatekeeper::default().validate(&decision, &portfolio(dec!(100000)), now);
        assert_eq!(
            assessment.status_of(RiskCheckKind::Freshness) == CheckStatus::Passed,
            fresh
        );
    }

    #[test]
    fn test_closed_market_fails_freshness() {
        let now = Utc::now();
        let mut decision = buy(Some(dec!(1)), now);
        decision.market.market_open = Some(false);
        let assessment = RiskGatekeeper::default().validate(&decision, &portfolio(dec!(100000)), now);
        assert_eq!(assessment.rejection, Some(RiskCheckKind::Freshness));
    }

    #[test]
    fn test_drawdown_rejects_above_limit() {
        let now = Utc::now();
        let mut state = portfolio(dec!(80000));
        state.equity_curve = vec![100_000.0, 90_000.0, 80_000.0];
        let assessment = RiskGatekeeper::default().validate(&buy(Some(dec!(1)), now), &state, now);
        assert_eq!(assessment.rejection, Some(RiskCheckKind::Drawdown));
        assert!((assessment.metrics.current_drawdown_pct - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_var_falls_back_to_class_default_with_short_history() {
        let now = Utc::now();
        let mut state = portfolio(dec!(100000));
        state
            .returns
            .insert(AssetId::new("BTC-USD"), vec![0.001, 0.001, 0.001, 0.001]);
        let assessment = RiskGatekeeper::default().validate(&buy(Some(dec!(10)), now), &state, now);
        assert_eq!(assessment.metrics.var_method, VarMethod::Bootstrap);
        assert!((assessment.metrics.volatility - 0.04).abs() < 1e-12);
        assert!(assessment.metrics.var_amount > 0.0);
    }

    #[test]
    fn test_var_uses_history_when_sufficient() {
        let now = Utc::now();
        let mut state = portfolio(dec!(100000));
        state
            .returns
            .insert(AssetId::new("BTC-USD"), trending_returns(40, 1.0));
        let assessment = RiskGatekeeper::default().validate(&buy(Some(dec!(10)), now), &state, now);
        assert_eq!(assessment.metrics.var_method, VarMethod::Historical);
        assert_eq!(assessment.metrics.history_len, 40);
    }

    #[test]
    fn test_correlated_same_direction_position_rejected() {
        let now = Utc::now();
        let mut state = portfolio(dec!(1000000));
        state.positions.push(open_position("ETH-USD", PositionSide::Long));
        state
            .returns
            .insert(AssetId::new("BTC-USD"), trending_returns(20, 1.0));
        state
            .returns
            .insert(AssetId::new("ETH-USD"), trending_returns(20, 2.0));
        let assessment = RiskGatekeeper::default().validate(&buy(Some(dec!(1)), now), &state, now);
        assert_eq!(assessment.rejection, Some(RiskCheckKind::Correlation));
        assert_eq!(
            assessment.metrics.correlated_with,
            Some(AssetId::new("ETH-USD"))
        );
    }

    #[test]
    fn test_correlated_opposite_direction_is_a_hedge() {
        let now = Utc::now();
        let mut state = portfolio(dec!(1000000));
        state.positions.push(open_position("ETH-USD", PositionSide::Short));
        state
            .returns
            .insert(AssetId::new("BTC-USD"), trending_returns(20, 1.0));
        state
            .returns
            .insert(AssetId::new("ETH-USD"), trending_returns(20, 2.0));
        let assessment = RiskGatekeeper::default().validate(&buy(Some(dec!(1)), now), &state, now);
        assert_eq!(assessment.status_of(RiskCheckKind::Correlation), CheckStatus::Passed);
    }

    #[test]
    fn test_concentration_rejects_oversized_trade() {
        let now = Utc::now();
        let assessment = RiskGatekeeper::default().validate(
            &buy(Some(dec!(300)), now),
            &portfolio(dec!(100000)),
            now,
        );
        assert!(!assessment.approved);
        assert!(assessment.metrics.concentration_pct > 0.25);
    }

    #[test]
    fn test_signal_only_skips_sizing_checks() {
        let now = Utc::now();
        let assessment =
            RiskGatekeeper::default().validate(&buy(None, now), &portfolio(dec!(100000)), now);
        assert_eq!(assessment.intent, TradeIntent::SignalOnly);
        assert!(assessment.approved);
        assert_eq!(assessment.status_of(RiskCheckKind::Freshness), CheckStatus::Passed);
        assert_eq!(assessment.status_of(RiskCheckKind::Drawdown), CheckStatus::Passed);
        assert_eq!(assessment.status_of(RiskCheckKind::Correlation), CheckStatus::Passed);
        assert_eq!(assessment.status_of(RiskCheckKind::ValueAtRisk), CheckStatus::Skipped);
        assert_eq!(assessment.status_of(RiskCheckKind::Concentration), CheckStatus::Skipped);
        assert_eq!(assessment.status_of(RiskCheckKind::Leverage), CheckStatus::Skipped);
        assert!(assessment.metrics.var_per_unit > 0.0);
    }

    #[test]
    fn test_reducing_trade_only_checks_freshness() {
        let now = Utc::now();
        let mut state = portfolio(dec!(50000));
        state.equity_curve = vec![100_000.0, 50_000.0];
        state.positions.push(open_position("BTC-USD", PositionSide::Short));
        let assessment = RiskGatekeeper::default().validate(&buy(Some(dec!(10)), now), &state, now);
        assert_eq!(assessment.intent, TradeIntent::Reduce);
        assert!(assessment.approved);
        assert_eq!(assessment.status_of(RiskCheckKind::Drawdown), CheckStatus::Skipped);
    }

    #[test]
    fn test_zero_equity_fails_sizing_checks() {
        let now = Utc::now();
        let state = PortfolioState {
            equity: Decimal::ZERO,
            marks: BTreeMap::new(),
            ..PortfolioState::default()
        };
        let assessment = RiskGatekeeper::default().validate(&buy(Some(dec!(1)), now), &state, now);
        assert!(!assessment.approved);
    }

    #[test]
    fn test_validate_is_idempotent() {
        let now = Utc::now();
        let mut state = portfolio(dec!(100000));
        state.positions.push(open_position("ETH-USD", PositionSide::Long));
        let decision = buy(Some(dec!(5)), now);
        let gk = RiskGatekeeper::default();
        assert_eq!(gk.validate(&decision, &state, now), gk.validate(&decision, &state, now));
    }
}
