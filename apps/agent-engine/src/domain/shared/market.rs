//! Market observations consumed by the agent.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::identifiers::AssetId;

/// Timeframe key for daily candles.
pub const DAILY_TIMEFRAME: &str = "1d";

/// Broad asset class, drives freshness and volatility defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetClass {
    /// Listed equities and ETFs.
    Equity,
    /// Crypto currencies, trade around the clock.
    Crypto,
    /// Currency pairs.
    Forex,
    /// Commodity futures and spot.
    Commodity,
}

impl AssetClass {
    /// Maximum snapshot age before the data is considered stale.
    #[must_use]
    pub const fn default_staleness(&self) -> Duration {
        match self {
            Self::Equity => Duration::from_secs(900),
            Self::Crypto => Duration::from_secs(120),
            Self::Forex => Duration::from_secs(300),
            Self::Commodity => Duration::from_secs(600),
        }
    }

    /// Conservative daily volatility used when history is insufficient.
    #[must_use]
    pub const fn default_daily_volatility(&self) -> f64 {
        match self {
            Self::Equity => 0.02,
            Self::Crypto => 0.04,
            Self::Forex => 0.008,
            Self::Commodity => 0.015,
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equity => write!(f, "EQUITY"),
            Self::Crypto => write!(f, "CRYPTO"),
            Self::Forex => write!(f, "FOREX"),
            Self::Commodity => write!(f, "COMMODITY"),
        }
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time.
    pub open_time: DateTime<Utc>,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Traded volume.
    #[serde(default)]
    pub volume: f64,
}

/// Point-in-time view of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Asset symbol.
    pub asset: AssetId,
    /// Asset class.
    pub asset_class: AssetClass,
    /// Last traded price.
    pub price: Decimal,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
    /// Whether the market is open, when the provider knows.
    #[serde(default)]
    pub market_open: Option<bool>,
    /// Candles per timeframe key (`1m`, `1h`, `1d`, ...), oldest first.
    #[serde(default)]
    pub timeframes: BTreeMap<String, Vec<Candle>>,
    /// Precomputed indicators by name.
    #[serde(default)]
    pub indicators: BTreeMap<String, f64>,
}

impl MarketSnapshot {
    /// Age of the observation at `now`, zero if stamped in the future.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }

    /// Indicator value by name.
    #[must_use]
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied().filter(|v| v.is_finite())
    }

    /// Daily candles, or the longest series when no daily series exists.
    #[must_use]
    pub fn daily_candles(&self) -> &[Candle] {
        if let Some(daily) = self.timeframes.get(DAILY_TIMEFRAME) {
            return daily;
        }
        self.timeframes
            .values()
            .max_by_key(|c| c.len())
            .map_or(&[][..], Vec::as_slice)
    }

    /// Close prices of [`Self::daily_candles`].
    #[must_use]
    pub fn closes(&self) -> Vec<f64> {
        self.daily_candles().iter().map(|c| c.close).collect()
    }

    /// Simple returns between consecutive closes.
    #[must_use]
    pub fn returns(&self) -> Vec<f64> {
        self.closes()
            .windows(2)
            .filter(|w| w[0] > 0.0 && w[1].is_finite())
            .map(|w| w[1] / w[0] - 1.0)
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::Duration as ChronoDuration;

    /// Snapshot with `closes` as daily candles ending at `timestamp`.
    pub fn snapshot_with_closes(
        asset: &str,
        class: AssetClass,
        price: Decimal,
        timestamp: DateTime<Utc>,
        closes: &[f64],
    ) -> MarketSnapshot {
        let days = closes.len() as i64;
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, close)| Candle {
                open_time: timestamp - ChronoDuration::days(days - i as i64),
                open: *close,
                high: *close,
                low: *close,
                close: *close,
                volume: 1_000.0,
            })
            .collect();
        let mut timeframes = BTreeMap::new();
        timeframes.insert(DAILY_TIMEFRAME.to_string(), candles);
        MarketSnapshot {
            asset: AssetId::new(asset),
            asset_class: class,
            price,
            timestamp,
            market_open: None,
            timeframes,
            indicators: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_returns_from_daily_closes() {
        let snap = fixtures::snapshot_with_closes(
            "SPY",
            AssetClass::Equity,
            dec!(110),
            Utc::now(),
            &[100.0, 110.0, 99.0],
        );
        let returns = snap.returns();
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.10).abs() < 1e-12);
        assert!((returns[1] + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_future_timestamp_has_zero_age() {
        let now = Utc::now();
        let snap = fixtures::snapshot_with_closes(
            "SPY",
            AssetClass::Equity,
            dec!(1),
            now + chrono::Duration::seconds(30),
            &[],
        );
        assert_eq!(snap.age(now), Duration::ZERO);
    }

    #[test]
    fn test_falls_back_to_longest_timeframe() {
        let mut snap =
            fixtures::snapshot_with_closes("X", AssetClass::Forex, dec!(1), Utc::now(), &[1.0, 2.0]);
        let daily = snap.timeframes.remove(DAILY_TIMEFRAME).unwrap();
        snap.timeframes.insert("1h".to_string(), daily);
        snap.timeframes.insert("1m".to_string(), Vec::new());
        assert_eq!(snap.closes(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_asset_class_defaults() {
        assert_eq!(AssetClass::Crypto.default_staleness(), Duration::from_secs(120));
        assert!((AssetClass::Crypto.default_daily_volatility() - 0.04).abs() < f64::EPSILON);
        assert!(AssetClass::Forex.default_daily_volatility() > 0.0);
    }
}
