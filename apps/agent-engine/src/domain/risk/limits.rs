//! Risk limits and asset-class profiles.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::shared::AssetClass;

/// Freshness and volatility defaults for one asset class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetClassProfile {
    /// Maximum snapshot age.
    pub staleness: Duration,
    /// Daily volatility floor used when history is insufficient.
    pub default_volatility: f64,
}

impl AssetClassProfile {
    /// Built-in profile for `class`.
    #[must_use]
    pub const fn defaults(class: AssetClass) -> Self {
        Self {
            staleness: class.default_staleness(),
            default_volatility: class.default_daily_volatility(),
        }
    }
}

/// Portfolio-level limits enforced before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// VaR confidence level, e.g. 0.95.
    pub var_confidence: f64,
    /// Maximum one-day VaR of the trade as a fraction of equity.
    pub max_var_pct: f64,
    /// Maximum drawdown from rolling peak equity.
    pub max_drawdown_pct: f64,
    /// Ceiling on directional correlation with any open position.
    pub max_correlation: f64,
    /// Maximum single-asset exposure over equity.
    pub max_concentration_pct: f64,
    /// Maximum gross exposure over equity.
    pub max_leverage: f64,
    /// Returns required before sample volatility is trusted.
    pub min_history: usize,
    /// Per asset-class overrides.
    pub profiles: HashMap<AssetClass, AssetClassProfile>,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            var_confidence: 0.95,
            max_var_pct: 0.02,
            max_drawdown_pct: 0.15,
            max_correlation: 0.8,
            max_concentration_pct: 0.25,
            max_leverage: 2.0,
            min_history: 30,
            profiles: HashMap::new(),
        }
    }
}

impl RiskLimits {
    /// Effective profile for `class`.
    #[must_use]
    pub fn profile(&self, class: AssetClass) -> AssetClassProfile {
        self.profiles
            .get(&class)
            .copied()
            .unwrap_or_else(|| AssetClassProfile::defaults(class))
    }
}
