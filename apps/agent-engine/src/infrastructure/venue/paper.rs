//! Paper trading venue.
//!
//! Fills every valid order immediately at the decision's reference price.
//! Orders are keyed by decision id, so a retried `execute` returns the
//! original fill instead of trading twice.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::application::ports::{AccountSnapshot, ExecutionReport, VenueError, VenuePort};
use crate::domain::decision::{Decision, TradeAction};
use crate::domain::risk::{Position, PositionSide};
use crate::domain::shared::{AssetId, DecisionId, OrderId};

#[derive(Debug, Default)]
struct Book {
    cash: Decimal,
    positions: BTreeMap<AssetId, Position>,
    marks: HashMap<AssetId, Decimal>,
    fills: HashMap<DecisionId, ExecutionReport>,
}

impl Book {
    fn equity(&self) -> Decimal {
        self.positions.values().fold(self.cash, |acc, p| {
            let mark = self.marks.get(&p.asset).copied().unwrap_or(p.entry_price);
            acc + p.signed_exposure(mark)
        })
    }

    fn fill(&mut self, decision: &Decision, quantity: Decimal, price: Decimal) {
        let notional = quantity * price;
        match decision.action {
            TradeAction::Buy => self.cash -= notional,
            TradeAction::Sell => self.cash += notional,
            TradeAction::Hold => return,
        }
        self.marks.insert(decision.asset.clone(), price);

        let Some(side) = PositionSide::opened_by(decision.action) else {
            return;
        };
        match self.positions.get_mut(&decision.asset) {
            Some(open) if open.is_closed_by(decision.action) => {
                if quantity >= open.quantity {
                    let remainder = quantity - open.quantity;
                    self.positions.remove(&decision.asset);
                    if remainder > Decimal::ZERO {
                        self.open(decision, side, remainder, price);
                    }
                } else {
                    open.quantity -= quantity;
                }
            }
            Some(open) => {
                let total = open.quantity + quantity;
                open.entry_price = (open.entry_price * open.quantity + price * quantity) / total;
                open.quantity = total;
            }
            None => self.open(decision, side, quantity, price),
        }
    }

    fn open(&mut self, decision: &Decision, side: PositionSide, quantity: Decimal, price: Decimal) {
        self.positions.insert(
            decision.asset.clone(),
            Position {
                asset: decision.asset.clone(),
                side,
                quantity,
                entry_price: price,
                opened_at: Utc::now(),
                decision_id: Some(decision.id.clone()),
                attribution: decision.ensemble_metadata.votes.clone(),
            },
        );
    }
}

/// In-process venue for paper trading and tests.
#[derive(Debug)]
pub struct PaperVenue {
    venue_id: String,
    book: RwLock<Book>,
}

impl PaperVenue {
    /// Create a flat account holding `starting_cash`.
    #[must_use]
    pub fn new(venue_id: impl Into<String>, starting_cash: Decimal) -> Self {
        Self {
            venue_id: venue_id.into(),
            book: RwLock::new(Book {
                cash: starting_cash,
                ..Book::default()
            }),
        }
    }

    /// Seed open positions, as if left over from an earlier run.
    #[must_use]
    pub fn with_positions(self, positions: impl IntoIterator<Item = Position>) -> Self {
        {
            let mut book = self.book.write().unwrap_or_else(PoisonError::into_inner);
            for position in positions {
                book.positions.insert(position.asset.clone(), position);
            }
        }
        self
    }

    /// Mark `asset` at `price` for equity calculation.
    pub fn set_mark(&self, asset: &AssetId, price: Decimal) {
        self.book
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .marks
            .insert(asset.clone(), price);
    }

    /// Number of distinct orders filled.
    #[must_use]
    pub fn fill_count(&self) -> usize {
        self.book
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .fills
            .len()
    }
}

#[async_trait]
impl VenuePort for PaperVenue {
    fn venue_id(&self) -> &str {
        &self.venue_id
    }

    async fn execute(&self, decision: &Decision) -> Result<ExecutionReport, VenueError> {
        let mut book = self.book.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(report) = book.fills.get(&decision.id) {
            tracing::debug!(decision_id = %decision.id, "Duplicate order, returning original fill");
            return Ok(report.clone());
        }

        if decision.action == TradeAction::Hold {
            return Err(VenueError::InvalidOrder("HOLD is not an order".to_string()));
        }
        let quantity = decision
            .recommended_position_size
            .filter(|q| *q > Decimal::ZERO)
            .ok_or_else(|| VenueError::InvalidOrder("missing quantity".to_string()))?;
        let price = decision.reference_price;
        if price <= Decimal::ZERO {
            return Err(VenueError::InvalidOrder(format!("non-positive price {price}")));
        }

        let closing = book
            .positions
            .get(&decision.asset)
            .is_some_and(|p| p.is_closed_by(decision.action));
        if !closing && quantity * price > book.cash.max(Decimal::ZERO) {
            return Err(VenueError::Rejected("insufficient buying power".to_string()));
        }

        book.fill(decision, quantity, price);
        let report = ExecutionReport {
            order_id: OrderId::generate(),
            decision_id: decision.id.clone(),
            filled_quantity: quantity,
            fill_price: price,
            executed_at: Utc::now(),
        };
        book.fills.insert(decision.id.clone(), report.clone());
        Ok(report)
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>, VenueError> {
        let book = self.book.read().unwrap_or_else(PoisonError::into_inner);
        Ok(book.positions.values().cloned().collect())
    }

    async fn get_account(&self) -> Result<AccountSnapshot, VenueError> {
        let book = self.book.read().unwrap_or_else(PoisonError::into_inner);
        Ok(AccountSnapshot {
            equity: book.equity(),
            cash: book.cash,
            buying_power: book.cash.max(Decimal::ZERO),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::fixtures::sized_decision;
    use crate::domain::shared::AssetClass;
    use crate::domain::shared::fixtures::snapshot_with_closes;
    use rust_decimal_macros::dec;

    fn decision(action: TradeAction, price: Decimal, size: Decimal) -> Decision {
        let snap = snapshot_with_closes("BTC-USD", AssetClass::Crypto, price, Utc::now(), &[]);
        sized_decision(&snap, action, Some(size))
    }

    #[tokio::test]
    async fn test_buy_then_close_realises_pnl_in_cash() {
        let venue = PaperVenue::new("paper", dec!(10000));
        venue
            .execute(&decision(TradeAction::Buy, dec!(100), dec!(10)))
            .await
            .unwrap();
        let account = venue.get_account().await.unwrap();
        assert_eq!(account.cash, dec!(9000));
        assert_eq!(account.equity, dec!(10000));
        assert_eq!(venue.get_open_positions().await.unwrap().len(), 1);

        venue
            .execute(&decision(TradeAction::Sell, dec!(110), dec!(10)))
            .await
            .unwrap();
        let account = venue.get_account().await.unwrap();
        assert_eq!(account.cash, dec!(10100));
        assert!(venue.get_open_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_execute_is_idempotent() {
        let venue = PaperVenue::new("paper", dec!(10000));
        let d = decision(TradeAction::Buy, dec!(100), dec!(1));
        let first = venue.execute(&d).await.unwrap();
        let second = venue.execute(&d).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(venue.fill_count(), 1);
        assert_eq!(venue.get_account().await.unwrap().cash, dec!(9900));
    }

    #[tokio::test]
    async fn test_rejects_orders_beyond_cash() {
        let venue = PaperVenue::new("paper", dec!(50));
        let err = venue
            .execute(&decision(TradeAction::Buy, dec!(100), dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, VenueError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_signal_only_is_invalid() {
        let venue = PaperVenue::new("paper", dec!(1000));
        let snap = snapshot_with_closes("BTC-USD", AssetClass::Crypto, dec!(10), Utc::now(), &[]);
        let d = sized_decision(&snap, TradeAction::Buy, None);
        assert!(matches!(
            venue.execute(&d).await.unwrap_err(),
            VenueError::InvalidOrder(_)
        ));
    }

    #[tokio::test]
    async fn test_short_equity_follows_marks() {
        let venue = PaperVenue::new("paper", dec!(1000));
        venue
            .execute(&decision(TradeAction::Sell, dec!(100), dec!(2)))
            .await
            .unwrap();
        venue.set_mark(&AssetId::new("BTC-USD"), dec!(120));
        let account = venue.get_account().await.unwrap();
        assert_eq!(account.cash, dec!(1200));
        assert_eq!(account.equity, dec!(960));
    }
}
