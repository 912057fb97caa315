//! Latched kill switch.
//!
//! Checked before every REASONING → RISK_CHECK transition. Once tripped it
//! stays tripped for every orchestrator sharing it until [`KillSwitch::reset`]
//! is called explicitly.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::observability;

/// Trip thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KillSwitchThresholds {
    /// Drawdown from peak equity that trips the switch.
    pub max_drawdown_pct: f64,
    /// Cumulative realised loss that trips the switch.
    pub max_cumulative_loss: Decimal,
}

impl Default for KillSwitchThresholds {
    fn default() -> Self {
        Self {
            max_drawdown_pct: 0.2,
            max_cumulative_loss: Decimal::from(10_000),
        }
    }
}

/// Why the switch tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KillSwitchReason {
    /// Drawdown beyond the threshold.
    Drawdown,
    /// Realised loss beyond the threshold.
    CumulativeLoss,
}

impl KillSwitchReason {
    /// Stable label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Drawdown => "DRAWDOWN",
            Self::CumulativeLoss => "CUMULATIVE_LOSS",
        }
    }
}

impl fmt::Display for KillSwitchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KillSwitchTrip {
    /// Trigger.
    pub reason: KillSwitchReason,
    /// Observed value (drawdown fraction or loss amount).
    pub value: f64,
    /// Trip time.
    pub tripped_at: DateTime<Utc>,
}

/// Shared latched kill switch.
#[derive(Debug, Default)]
pub struct KillSwitch {
    thresholds: KillSwitchThresholds,
    trip: Mutex<Option<KillSwitchTrip>>,
}

impl KillSwitch {
    /// Create an armed switch.
    #[must_use]
    pub const fn new(thresholds: KillSwitchThresholds) -> Self {
        Self {
            thresholds,
            trip: Mutex::new(None),
        }
    }

    /// Configured thresholds.
    #[must_use]
    pub const fn thresholds(&self) -> &KillSwitchThresholds {
        &self.thresholds
    }

    /// Whether the switch has tripped.
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.status().is_some()
    }

    /// The latched trip, if any.
    #[must_use]
    pub fn status(&self) -> Option<KillSwitchTrip> {
        *self.trip.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluate the thresholds and latch on breach.
    ///
    /// Returns the active trip, either already latched or newly raised.
    pub fn evaluate(
        &self,
        drawdown_pct: f64,
        realized_pnl: Decimal,
    ) -> Option<KillSwitchTrip> {
        let mut trip = self.trip.lock().unwrap_or_else(PoisonError::into_inner);
        if trip.is_some() {
            return *trip;
        }

        let loss = -realized_pnl;
        let reason = if drawdown_pct > self.thresholds.max_drawdown_pct {
            Some((KillSwitchReason::Drawdown, drawdown_pct))
        } else if loss > self.thresholds.max_cumulative_loss {
            Some((
                KillSwitchReason::CumulativeLoss,
                crate::domain::risk::to_f64(loss),
            ))
        } else {
            None
        };

        if let Some((reason, value)) = reason {
            *trip = Some(KillSwitchTrip {
                reason,
                value,
                tripped_at: Utc::now(),
            });
            observability::record_kill_switch_trip(reason.as_str());
            tracing::error!(reason = %reason, value, "Kill switch tripped, trading halted");
        }
        *trip
    }

    /// Re-arm the switch.
    pub fn reset(&self) {
        let mut trip = self.trip.lock().unwrap_or_else(PoisonError::into_inner);
        if trip.take().is_some() {
            tracing::warn!("Kill switch reset");
        }
    }
}
