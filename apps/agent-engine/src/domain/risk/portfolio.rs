//! Positions, closed-trade outcomes and the portfolio view used by risk checks.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::decision::{TradeAction, VoteRecord};
use crate::domain::shared::{AssetId, DecisionId};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    /// Bought.
    Long,
    /// Sold short.
    Short,
}

impl PositionSide {
    /// Side opened by `action` when flat.
    #[must_use]
    pub const fn opened_by(action: TradeAction) -> Option<Self> {
        match action {
            TradeAction::Buy => Some(Self::Long),
            TradeAction::Sell => Some(Self::Short),
            TradeAction::Hold => None,
        }
    }

    /// Action that closes this side.
    #[must_use]
    pub const fn closing_action(&self) -> TradeAction {
        match self {
            Self::Long => TradeAction::Sell,
            Self::Short => TradeAction::Buy,
        }
    }

    /// +1 for long, -1 for short.
    #[must_use]
    pub const fn sign(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    fn decimal_sign(self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// An open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Asset held.
    pub asset: AssetId,
    /// Direction.
    pub side: PositionSide,
    /// Absolute quantity.
    pub quantity: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Open time.
    pub opened_at: DateTime<Utc>,
    /// Decision that opened the position, when known.
    pub decision_id: Option<DecisionId>,
    /// Votes behind the opening decision.
    #[serde(default)]
    pub attribution: Vec<VoteRecord>,
}

impl Position {
    /// Whether `action` closes this position.
    #[must_use]
    pub fn is_closed_by(&self, action: TradeAction) -> bool {
        action == self.side.closing_action()
    }

    /// Signed exposure at `price`.
    #[must_use]
    pub fn signed_exposure(&self, price: Decimal) -> Decimal {
        self.side.decimal_sign() * self.quantity * price
    }

    /// Profit or loss from closing at `exit_price`.
    #[must_use]
    pub fn pnl_at(&self, exit_price: Decimal) -> Decimal {
        self.side.decimal_sign() * (exit_price - self.entry_price) * self.quantity
    }
}

/// A closed trade, used by learning and the kill switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    /// Decision that closed the position.
    pub decision_id: DecisionId,
    /// Decision that opened it, when known.
    pub opening_decision_id: Option<DecisionId>,
    /// Asset traded.
    pub asset: AssetId,
    /// Side that was closed.
    pub side: PositionSide,
    /// Quantity closed.
    pub quantity: Decimal,
    /// Entry price.
    pub entry_price: Decimal,
    /// Exit price.
    pub exit_price: Decimal,
    /// Realised profit or loss.
    pub realized_pnl: Decimal,
    /// Votes behind the opening decision.
    pub attribution: Vec<VoteRecord>,
    /// Close time.
    pub closed_at: DateTime<Utc>,
}

impl TradeOutcome {
    /// Close `position` at `exit_price` for decision `decision_id`.
    #[must_use]
    pub fn close(position: Position, decision_id: DecisionId, exit_price: Decimal) -> Self {
        Self {
            realized_pnl: position.pnl_at(exit_price),
            decision_id,
            opening_decision_id: position.decision_id,
            asset: position.asset,
            side: position.side,
            quantity: position.quantity,
            entry_price: position.entry_price,
            exit_price,
            attribution: position.attribution,
            closed_at: Utc::now(),
        }
    }

    /// Action of the opening decision.
    #[must_use]
    pub const fn opening_action(&self) -> TradeAction {
        match self.side {
            PositionSide::Long => TradeAction::Buy,
            PositionSide::Short => TradeAction::Sell,
        }
    }
}

/// Portfolio view handed to the risk gatekeeper.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PortfolioState {
    /// Account equity.
    pub equity: Decimal,
    /// Open positions.
    pub positions: Vec<Position>,
    /// Latest price per asset.
    pub marks: BTreeMap<AssetId, Decimal>,
    /// Rolling equity curve, oldest first.
    pub equity_curve: Vec<f64>,
    /// Rolling daily returns per asset, oldest first.
    pub returns: BTreeMap<AssetId, Vec<f64>>,
}

impl PortfolioState {
    /// Open position in `asset`.
    #[must_use]
    pub fn position(&self, asset: &AssetId) -> Option<&Position> {
        self.positions.iter().find(|p| &p.asset == asset)
    }

    /// Latest price for `asset`, falling back to the entry price.
    #[must_use]
    pub fn mark(&self, position: &Position) -> Decimal {
        self.marks
            .get(&position.asset)
            .copied()
            .unwrap_or(position.entry_price)
    }

    /// Signed exposure to `asset`.
    #[must_use]
    pub fn exposure_to(&self, asset: &AssetId) -> f64 {
        self.position(asset)
            .map_or(0.0, |p| to_f64(p.signed_exposure(self.mark(p))))
    }

    /// Sum of absolute exposures.
    #[must_use]
    pub fn gross_exposure(&self) -> f64 {
        self.positions
            .iter()
            .map(|p| to_f64(p.signed_exposure(self.mark(p))).abs())
            .sum()
    }

    /// Equity as `f64`.
    #[must_use]
    pub fn equity_f64(&self) -> f64 {
        to_f64(self.equity)
    }

    /// Returns recorded for `asset`.
    #[must_use]
    pub fn returns_of(&self, asset: &AssetId) -> &[f64] {
        self.returns.get(asset).map_or(&[][..], Vec::as_slice)
    }
}

/// Lossy decimal to float conversion for statistics.
#[must_use]
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
