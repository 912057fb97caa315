//! Rule-based advisory providers.
//!
//! Each advisor prefers a precomputed indicator from the snapshot and falls
//! back to deriving it from daily closes. Too little data is reported as an
//! invalid response so the ensemble degrades instead of voting on noise.

use async_trait::async_trait;

use crate::application::ports::{AdvisoryContext, AdvisoryError, AdvisoryProvider};
use crate::config::ProviderSettings;
use crate::domain::decision::{ProviderVote, TradeAction};
use crate::domain::risk::statistics::mean;
use crate::domain::shared::{MarketSnapshot, ProviderId};

const BASE_CONFIDENCE: f64 = 50.0;
const MAX_CONFIDENCE: f64 = 95.0;

fn insufficient(what: &str, needed: usize, got: usize) -> AdvisoryError {
    AdvisoryError::InvalidResponse(format!("{what} needs {needed} closes, got {got}"))
}

/// Confidence growing with `strength` (1.0 = at threshold), capped.
fn scaled_confidence(strength: f64) -> f64 {
    (BASE_CONFIDENCE + strength.max(0.0) * 15.0).min(MAX_CONFIDENCE)
}

/// Rate of change over `lookback` closes.
fn rate_of_change(closes: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || closes.len() <= lookback {
        return None;
    }
    let last = *closes.last()?;
    let base = closes[closes.len() - 1 - lookback];
    (base > 0.0).then(|| last / base - 1.0)
}

/// RSI from simple average gains and losses over the last `period` changes.
fn relative_strength_index(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }
    let tail = &closes[closes.len() - 1 - period..];
    let (gains, losses) = tail.windows(2).fold((0.0, 0.0), |(g, l), w| {
        let change = w[1] - w[0];
        if change >= 0.0 {
            (g + change, l)
        } else {
            (g, l - change)
        }
    });
    if losses == 0.0 {
        return Some(if gains == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = gains / losses;
    Some(100.0 - 100.0 / (1.0 + rs))
}

fn simple_moving_average(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    mean(&closes[closes.len() - period..])
}

/// Follows recent rate of change.
#[derive(Debug, Clone)]
pub struct MomentumAdvisor {
    id: ProviderId,
    lookback: usize,
    threshold: f64,
}

impl MomentumAdvisor {
    /// Indicator read before computing from closes.
    pub const INDICATOR: &'static str = "momentum";

    /// Build from provider settings (`lookback`, `threshold`).
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            id: ProviderId::new(&settings.id),
            lookback: settings.param("lookback", 10.0).max(1.0) as usize,
            threshold: settings.param("threshold", 0.02).abs().max(f64::EPSILON),
        }
    }

    fn vote(&self, snapshot: &MarketSnapshot) -> Result<ProviderVote, AdvisoryError> {
        let roc = match snapshot.indicator(Self::INDICATOR) {
            Some(value) => value,
            None => {
                let closes = snapshot.closes();
                rate_of_change(&closes, self.lookback)
                    .ok_or_else(|| insufficient("momentum", self.lookback.saturating_add(1), closes.len()))?
            }
        };
        let strength = roc.abs() / self.threshold;
        let (action, confidence) = if roc > self.threshold {
            (TradeAction::Buy, scaled_confidence(strength))
        } else if roc < -self.threshold {
            (TradeAction::Sell, scaled_confidence(strength))
        } else {
            (TradeAction::Hold, BASE_CONFIDENCE + (1.0 - strength) * 20.0)
        };
        Ok(ProviderVote::new(
            self.id.clone(),
            action,
            confidence,
            format!("rate of change {:.2}% vs threshold {:.2}%", roc * 100.0, self.threshold * 100.0),
        ))
    }
}

#[async_trait]
impl AdvisoryProvider for MomentumAdvisor {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn query(&self, context: &AdvisoryContext) -> Result<ProviderVote, AdvisoryError> {
        self.vote(&context.snapshot)
    }
}

/// Fades RSI extremes.
#[derive(Debug, Clone)]
pub struct MeanReversionAdvisor {
    id: ProviderId,
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl MeanReversionAdvisor {
    /// Indicator read before computing from closes.
    pub const INDICATOR: &'static str = "rsi";

    /// Build from provider settings (`period`, `oversold`, `overbought`).
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let oversold = settings.param("oversold", 30.0).clamp(0.0, 50.0);
        Self {
            id: ProviderId::new(&settings.id),
            period: settings.param("period", 14.0).max(1.0) as usize,
            oversold,
            overbought: settings.param("overbought", 70.0).clamp(oversold, 100.0),
        }
    }

    fn vote(&self, snapshot: &MarketSnapshot) -> Result<ProviderVote, AdvisoryError> {
        let rsi = match snapshot.indicator(Self::INDICATOR) {
            Some(value) => value,
            None => {
                let closes = snapshot.closes();
                relative_strength_index(&closes, self.period)
                    .ok_or_else(|| insufficient("RSI", self.period.saturating_add(1), closes.len()))?
            }
        };
        let (action, confidence) = if rsi < self.oversold {
            let depth = (self.oversold - rsi) / self.oversold.max(1.0);
            (TradeAction::Buy, scaled_confidence(1.0 + depth * 2.0))
        } else if rsi > self.overbought {
            let depth = (rsi - self.overbought) / (100.0 - self.overbought).max(1.0);
            (TradeAction::Sell, scaled_confidence(1.0 + depth * 2.0))
        } else {
            (TradeAction::Hold, 60.0)
        };
        Ok(ProviderVote::new(
            self.id.clone(),
            action,
            confidence,
            format!("RSI {rsi:.1} (bands {:.0}/{:.0})", self.oversold, self.overbought),
        ))
    }
}

#[async_trait]
impl AdvisoryProvider for MeanReversionAdvisor {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn query(&self, context: &AdvisoryContext) -> Result<ProviderVote, AdvisoryError> {
        self.vote(&context.snapshot)
    }
}

/// Moving-average crossover.
#[derive(Debug, Clone)]
pub struct TrendAdvisor {
    id: ProviderId,
    fast: usize,
    slow: usize,
}

impl TrendAdvisor {
    /// Fast average indicator.
    pub const FAST_INDICATOR: &'static str = "sma_fast";
    /// Slow average indicator.
    pub const SLOW_INDICATOR: &'static str = "sma_slow";

    /// Build from provider settings (`fast`, `slow`).
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let fast = settings.param("fast", 10.0).max(1.0) as usize;
        Self {
            id: ProviderId::new(&settings.id),
            fast,
            slow: (settings.param("slow", 30.0) as usize).max(fast.saturating_add(1)),
        }
    }

    fn averages(&self, snapshot: &MarketSnapshot) -> Result<(f64, f64), AdvisoryError> {
        if let (Some(fast), Some(slow)) = (
            snapshot.indicator(Self::FAST_INDICATOR),
            snapshot.indicator(Self::SLOW_INDICATOR),
        ) {
            return Ok((fast, slow));
        }
        let closes = snapshot.closes();
        simple_moving_average(&closes, self.fast)
            .zip(simple_moving_average(&closes, self.slow))
            .ok_or_else(|| insufficient("trend", self.slow, closes.len()))
    }

    fn vote(&self, snapshot: &MarketSnapshot) -> Result<ProviderVote, AdvisoryError> {
        let (fast, slow) = self.averages(snapshot)?;
        if slow <= 0.0 {
            return Err(AdvisoryError::InvalidResponse(format!("slow average {slow}")));
        }
        let spread = fast / slow - 1.0;
        let strength = spread.abs() / 0.01;
        let action = if spread > 0.0 {
            TradeAction::Buy
        } else if spread < 0.0 {
            TradeAction::Sell
        } else {
            TradeAction::Hold
        };
        Ok(ProviderVote::new(
            self.id.clone(),
            action,
            scaled_confidence(strength),
            format!("SMA{} {fast:.2} vs SMA{} {slow:.2}", self.fast, self.slow),
        ))
    }
}

#[async_trait]
impl AdvisoryProvider for TrendAdvisor {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn query(&self, context: &AdvisoryContext) -> Result<ProviderVote, AdvisoryError> {
        self.vote(&context.snapshot)
    }
}
