//! Process-wide equity curve, realised PnL, marks and return history.
//!
//! Feeds the drawdown check, VaR, correlation and the kill switch. Every
//! orchestrator shares one tracker.
//!
//! Equity comes from venue account snapshots. When the venue cannot answer,
//! [`PortfolioTracker::mark_to_market`] values the open positions at the
//! latest snapshot prices on top of the last known cash.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;

use crate::application::ports::AccountSnapshot;
use crate::domain::risk::{PortfolioState, Position, to_f64};
use crate::domain::shared::{AssetId, MarketSnapshot};

#[derive(Debug)]
struct TrackerInner {
    equity: Decimal,
    cash: Decimal,
    peak_equity: f64,
    equity_curve: VecDeque<f64>,
    realized_pnl: Decimal,
    marks: BTreeMap<AssetId, Decimal>,
    returns: BTreeMap<AssetId, Vec<f64>>,
}

/// Shared portfolio statistics.
#[derive(Debug)]
pub struct PortfolioTracker {
    history_window: usize,
    inner: Mutex<TrackerInner>,
}

impl PortfolioTracker {
    /// Start tracking from `starting_equity`, keeping `history_window`
    /// equity points and returns per asset.
    #[must_use]
    pub fn new(starting_equity: Decimal, history_window: usize) -> Self {
        let start = to_f64(starting_equity);
        Self {
            history_window: history_window.max(2),
            inner: Mutex::new(TrackerInner {
                equity: starting_equity,
                cash: starting_equity,
                peak_equity: start,
                equity_curve: VecDeque::from([start]),
                realized_pnl: Decimal::ZERO,
                marks: BTreeMap::new(),
                returns: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record equity and cash reported by the venue.
    pub fn record_account(&self, account: &AccountSnapshot) {
        let mut inner = self.lock();
        inner.cash = account.cash;
        self.push_equity(&mut inner, account.equity);
    }

    /// Value `positions` at the latest marks (entry price when no snapshot
    /// was seen) on top of the last known cash, and record the result.
    pub fn mark_to_market(&self, positions: &[Position]) -> Decimal {
        let mut inner = self.lock();
        let exposure: Decimal = positions
            .iter()
            .map(|p| {
                let mark = inner.marks.get(&p.asset).copied().unwrap_or(p.entry_price);
                p.signed_exposure(mark)
            })
            .sum();
        let equity = inner.cash + exposure;
        self.push_equity(&mut inner, equity);
        equity
    }

    fn push_equity(&self, inner: &mut TrackerInner, equity: Decimal) {
        let value = to_f64(equity);
        inner.equity = equity;
        inner.peak_equity = inner.peak_equity.max(value);
        inner.equity_curve.push_back(value);
        while inner.equity_curve.len() > self.history_window {
            inner.equity_curve.pop_front();
        }
    }

    /// Record the price and daily returns carried by a snapshot.
    pub fn record_snapshot(&self, snapshot: &MarketSnapshot) {
        let mut returns = snapshot.returns();
        if returns.len() > self.history_window {
            returns.drain(..returns.len() - self.history_window);
        }
        let mut inner = self.lock();
        inner.marks.insert(snapshot.asset.clone(), snapshot.price);
        if !returns.is_empty() {
            inner.returns.insert(snapshot.asset.clone(), returns);
        }
    }

    /// Add realised profit or loss from a closed trade.
    pub fn record_realized(&self, pnl: Decimal) {
        let mut inner = self.lock();
        inner.realized_pnl += pnl;
    }

    /// Latest equity.
    #[must_use]
    pub fn equity(&self) -> Decimal {
        self.lock().equity
    }

    /// Cumulative realised PnL.
    #[must_use]
    pub fn realized_pnl(&self) -> Decimal {
        self.lock().realized_pnl
    }

    /// Drawdown of the latest equity from the all-time peak.
    #[must_use]
    pub fn drawdown_from_peak(&self) -> f64 {
        let inner = self.lock();
        let last = inner.equity_curve.back().copied().unwrap_or(inner.peak_equity);
        if inner.peak_equity <= 0.0 {
            return 0.0;
        }
        ((inner.peak_equity - last) / inner.peak_equity).max(0.0)
    }

    /// Portfolio view for the risk gatekeeper.
    #[must_use]
    pub fn portfolio_state(&self, positions: Vec<Position>) -> PortfolioState {
        let inner = self.lock();
        PortfolioState {
            equity: inner.equity,
            positions,
            marks: inner.marks.clone(),
            equity_curve: inner.equity_curve.iter().copied().collect(),
            returns: inner.returns.clone(),
        }
    }
}
