//! Itemised result of validating one decision.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::shared::AssetId;

/// Risk checks in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskCheckKind {
    /// Snapshot age and market hours.
    Freshness,
    /// Drawdown from rolling peak equity.
    Drawdown,
    /// Value at risk of the proposed trade.
    ValueAtRisk,
    /// Directional correlation with open positions.
    Correlation,
    /// Single-asset exposure.
    Concentration,
    /// Gross exposure over equity.
    Leverage,
}

impl RiskCheckKind {
    /// Evaluation order.
    pub const ORDER: [Self; 6] = [
        Self::Freshness,
        Self::Drawdown,
        Self::ValueAtRisk,
        Self::Correlation,
        Self::Concentration,
        Self::Leverage,
    ];

    /// Stable label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Freshness => "FRESHNESS",
            Self::Drawdown => "DRAWDOWN",
            Self::ValueAtRisk => "VALUE_AT_RISK",
            Self::Correlation => "CORRELATION",
            Self::Concentration => "CONCENTRATION",
            Self::Leverage => "LEVERAGE",
        }
    }
}

impl fmt::Display for RiskCheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    /// Within limit.
    Passed,
    /// Limit breached.
    Failed,
    /// Not applicable to this decision.
    Skipped,
    /// Not evaluated because an earlier check failed.
    NotEvaluated,
}

/// One itemised check. `value` is always populated, even when not evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheck {
    /// Check kind.
    pub kind: RiskCheckKind,
    /// Outcome.
    pub status: CheckStatus,
    /// Observed value.
    pub value: f64,
    /// Configured limit.
    pub limit: f64,
}

/// How the volatility behind VaR was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VarMethod {
    /// Sample volatility of recent returns.
    Historical,
    /// Insufficient history; floored at the asset-class default.
    Bootstrap,
}

/// How the decision affects exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeIntent {
    /// Opens new exposure.
    Open,
    /// Closes an existing position.
    Reduce,
    /// No sizing available.
    SignalOnly,
    /// No trade.
    Hold,
}

/// Every metric the gatekeeper computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Snapshot age at validation time.
    pub snapshot_age_secs: f64,
    /// Drawdown of current equity from the rolling peak.
    pub current_drawdown_pct: f64,
    /// Worst drawdown within the rolling window.
    pub max_drawdown_pct: f64,
    /// Daily volatility used for VaR.
    pub volatility: f64,
    /// Returns available for the asset.
    pub history_len: usize,
    /// How volatility was obtained.
    pub var_method: VarMethod,
    /// VaR per unit of notional (z × σ); never zero.
    pub var_per_unit: f64,
    /// VaR of the proposed notional.
    pub var_amount: f64,
    /// VaR of the proposed notional over equity.
    pub var_pct: f64,
    /// Highest directional correlation with an open position.
    pub max_correlation: Option<f64>,
    /// Position producing `max_correlation`.
    pub correlated_with: Option<AssetId>,
    /// Exposure to the asset after the trade over equity.
    pub concentration_pct: f64,
    /// Gross exposure after the trade over equity.
    pub leverage: f64,
    /// Notional of the proposed trade.
    pub proposed_notional: f64,
}

/// Result of validating one decision against the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Whether every evaluated check passed.
    pub approved: bool,
    /// Exposure effect of the decision.
    pub intent: TradeIntent,
    /// Computed metrics.
    pub metrics: RiskMetrics,
    /// Checks in evaluation order.
    pub checks: Vec<RiskCheck>,
    /// First failed check.
    pub rejection: Option<RiskCheckKind>,
    /// Validation time.
    pub evaluated_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Look up a check by kind.
    #[must_use]
    pub fn check(&self, kind: RiskCheckKind) -> Option<&RiskCheck> {
        self.checks.iter().find(|c| c.kind == kind)
    }

    /// Status of a check, `Skipped` when absent.
    #[must_use]
    pub fn status_of(&self, kind: RiskCheckKind) -> CheckStatus {
        self.check(kind).map_or(CheckStatus::Skipped, |c| c.status)
    }
}
