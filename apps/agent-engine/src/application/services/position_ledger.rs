//! Process-wide ledger of open positions with slot reservation.
//!
//! Opening a position takes a slot. Slots are reserved atomically before
//! EXECUTION; a [`Reservation`] that is dropped without being committed
//! gives its slot back, so a refused order never leaks capacity.
//!
//! An order whose outcome is unknown (timeout, outage) may have filled, so
//! its slot is held as unconfirmed until a venue position fetch that began
//! after the hold settles it through [`PositionLedger::reconcile`].
//!
//! Every commit, close and hold bumps the ledger epoch. Reconciliation only
//! applies the venue's view to assets untouched since the fetch began, so a
//! slow fetch never erases a position committed while it was in flight.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::domain::risk::Position;
use crate::domain::shared::AssetId;
use crate::observability;

/// Refused reservation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionLimitError {
    /// Every slot is taken.
    #[error("position limit reached: {occupied} of {max} slots in use")]
    LimitReached {
        /// Open plus reserved positions.
        occupied: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The asset already has an open or pending position.
    #[error("position already open or pending for {0}")]
    AlreadyOpen(AssetId),
}

#[derive(Debug, Default)]
struct LedgerInner {
    open: BTreeMap<AssetId, Position>,
    reserved: BTreeSet<AssetId>,
    /// Asset → epoch of the hold.
    unconfirmed: BTreeMap<AssetId, u64>,
    /// Asset → epoch of its last local change.
    changed: BTreeMap<AssetId, u64>,
    epoch: u64,
}

impl LedgerInner {
    fn occupied(&self) -> usize {
        self.open.len() + self.reserved.len() + self.unconfirmed.len()
    }

    fn holds(&self, asset: &AssetId) -> bool {
        self.open.contains_key(asset)
            || self.reserved.contains(asset)
            || self.unconfirmed.contains_key(asset)
    }

    fn touch(&mut self, asset: &AssetId) -> u64 {
        self.epoch += 1;
        self.changed.insert(asset.clone(), self.epoch);
        self.epoch
    }

    fn changed_since(&self, asset: &AssetId, epoch: u64) -> bool {
        self.changed.get(asset).is_some_and(|at| *at > epoch)
    }
}

/// Open positions shared by every orchestrator.
#[derive(Debug)]
pub struct PositionLedger {
    max_open: usize,
    inner: Mutex<LedgerInner>,
}

impl PositionLedger {
    /// Create an empty ledger allowing `max_open` concurrent positions.
    #[must_use]
    pub fn new(max_open: usize) -> Self {
        Self {
            max_open,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configured maximum.
    #[must_use]
    pub const fn max_open(&self) -> usize {
        self.max_open
    }

    /// Reserve a slot for a new position in `asset`.
    ///
    /// # Errors
    ///
    /// Returns [`PositionLimitError`] when the limit is reached or the asset
    /// already holds a slot.
    pub fn reserve(self: &Arc<Self>, asset: &AssetId) -> Result<Reservation, PositionLimitError> {
        let mut inner = self.lock();
        if inner.holds(asset) {
            return Err(PositionLimitError::AlreadyOpen(asset.clone()));
        }
        let occupied = inner.occupied();
        if occupied >= self.max_open {
            return Err(PositionLimitError::LimitReached {
                occupied,
                max: self.max_open,
            });
        }
        inner.reserved.insert(asset.clone());
        tracing::debug!(asset = %asset, occupied = occupied + 1, "Position slot reserved");
        Ok(Reservation {
            ledger: Arc::clone(self),
            asset: asset.clone(),
            settled: false,
        })
    }

    /// Remove and return the open position in `asset`.
    pub fn close(&self, asset: &AssetId) -> Option<Position> {
        let mut inner = self.lock();
        let closed = inner.open.remove(asset);
        if closed.is_some() {
            inner.touch(asset);
        }
        observability::update_open_positions(inner.open.len());
        closed
    }

    /// Current epoch. Take it before fetching positions from the venue and
    /// hand it to [`PositionLedger::reconcile`].
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Merge the positions the venue reported in a fetch that began at
    /// `fetched_at`.
    ///
    /// Assets changed locally after `fetched_at` keep their local state, and
    /// assets with a live reservation are left to its owner. Unconfirmed holds
    /// taken before the fetch are released: the venue's answer covers them.
    /// Positions beyond the limit are kept: live exposure is never dropped.
    pub fn reconcile(&self, positions: Vec<Position>, fetched_at: u64) {
        let mut inner = self.lock();
        let reported: BTreeMap<AssetId, Position> = positions
            .into_iter()
            .map(|p| (p.asset.clone(), p))
            .collect();

        let mut open: BTreeMap<AssetId, Position> = inner
            .open
            .iter()
            .filter(|(asset, _)| inner.changed_since(asset, fetched_at))
            .map(|(asset, p)| (asset.clone(), p.clone()))
            .collect();
        for (asset, position) in reported {
            if !inner.changed_since(&asset, fetched_at) && !inner.reserved.contains(&asset) {
                open.insert(asset, position);
            }
        }

        let before = inner.unconfirmed.len();
        inner.unconfirmed.retain(|_, held_at| *held_at > fetched_at);
        let settled = before - inner.unconfirmed.len();
        if settled > 0 {
            tracing::info!(settled, "Unconfirmed position slots settled by the venue");
        }

        inner.open = open;
        if inner.open.len() > self.max_open {
            tracing::warn!(
                open = inner.open.len(),
                max = self.max_open,
                "Recovered more open positions than the limit allows"
            );
        }
        observability::update_open_positions(inner.open.len());
    }

    /// Open position in `asset`.
    #[must_use]
    pub fn position(&self, asset: &AssetId) -> Option<Position> {
        self.lock().open.get(asset).cloned()
    }

    /// All open positions.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.lock().open.values().cloned().collect()
    }

    /// Number of open positions, excluding reservations.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.lock().open.len()
    }

    /// Slots held for orders whose outcome is not yet known.
    #[must_use]
    pub fn unconfirmed_count(&self) -> usize {
        self.lock().unconfirmed.len()
    }
}

/// A held position slot.
#[derive(Debug)]
#[must_use = "dropping a reservation releases the slot"]
pub struct Reservation {
    ledger: Arc<PositionLedger>,
    asset: AssetId,
    settled: bool,
}

impl Reservation {
    /// Asset the slot is held for.
    #[must_use]
    pub const fn asset(&self) -> &AssetId {
        &self.asset
    }

    /// Turn the slot into an open position.
    pub fn commit(mut self, position: Position) {
        let mut inner = self.ledger.lock();
        inner.reserved.remove(&self.asset);
        inner.open.insert(self.asset.clone(), position);
        inner.touch(&self.asset);
        observability::update_open_positions(inner.open.len());
        self.settled = true;
    }

    /// Keep the slot until the venue confirms whether the order filled.
    pub fn hold_unconfirmed(mut self) {
        let mut inner = self.ledger.lock();
        inner.reserved.remove(&self.asset);
        let epoch = inner.touch(&self.asset);
        inner.unconfirmed.insert(self.asset.clone(), epoch);
        tracing::warn!(asset = %self.asset, "Position slot held until the venue confirms the order");
        self.settled = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            self.ledger.lock().reserved.remove(&self.asset);
            tracing::debug!(asset = %self.asset, "Position slot released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::risk::PositionSide;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn position(asset: &str) -> Position {
        Position {
            asset: AssetId::new(asset),
            side: PositionSide::Long,
            quantity: dec!(1),
            entry_price: dec!(100),
            opened_at: Utc::now(),
            decision_id: None,
            attribution: Vec::new(),
        }
    }

    #[test]
    fn test_limit_counts_reservations() {
        let ledger = Arc::new(PositionLedger::new(2));
        let a = ledger.reserve(&AssetId::new("A")).unwrap();
        let _b = ledger.reserve(&AssetId::new("B")).unwrap();
        let err = ledger.reserve(&AssetId::new("C")).unwrap_err();
        assert_eq!(err, PositionLimitError::LimitReached { occupied: 2, max: 2 });
        drop(a);
        assert!(ledger.reserve(&AssetId::new("C")).is_ok());
    }

    #[test]
    fn test_commit_opens_position() {
        let ledger = Arc::new(PositionLedger::new(2));
        let slot = ledger.reserve(&AssetId::new("A")).unwrap();
        slot.commit(position("A"));
        assert_eq!(ledger.open_count(), 1);
        assert_eq!(
            ledger.reserve(&AssetId::new("A")).unwrap_err(),
            PositionLimitError::AlreadyOpen(AssetId::new("A"))
        );
        assert!(ledger.close(&AssetId::new("A")).is_some());
        assert_eq!(ledger.open_count(), 0);
    }

    #[test]
    fn test_reconcile_keeps_excess_positions() {
        let ledger = Arc::new(PositionLedger::new(2));
        ledger.reconcile(vec![position("A"), position("B"), position("C")], ledger.epoch());
        assert_eq!(ledger.open_count(), 3);
        assert!(ledger.reserve(&AssetId::new("D")).is_err());
    }

    #[test]
    fn test_reconcile_replaces_untouched_positions() {
        let ledger = Arc::new(PositionLedger::new(2));
        ledger.reserve(&AssetId::new("A")).unwrap().commit(position("A"));

        // The venue no longer has A and reports B instead.
        ledger.reconcile(vec![position("B")], ledger.epoch());

        assert!(ledger.position(&AssetId::new("A")).is_none());
        assert!(ledger.position(&AssetId::new("B")).is_some());
    }

    #[test]
    fn test_reconcile_keeps_positions_committed_during_fetch() {
        let ledger = Arc::new(PositionLedger::new(2));
        let fetched_at = ledger.epoch();
        ledger.reserve(&AssetId::new("A")).unwrap().commit(position("A"));

        // The venue answered before A filled.
        ledger.reconcile(vec![position("B")], fetched_at);

        assert_eq!(ledger.open_count(), 2);
        assert!(ledger.position(&AssetId::new("A")).is_some());
    }

    #[test]
    fn test_reconcile_keeps_positions_closed_during_fetch() {
        let ledger = Arc::new(PositionLedger::new(2));
        ledger.reconcile(vec![position("A")], ledger.epoch());
        let fetched_at = ledger.epoch();
        ledger.close(&AssetId::new("A"));

        ledger.reconcile(vec![position("A")], fetched_at);

        assert_eq!(ledger.open_count(), 0);
    }

    #[test]
    fn test_unconfirmed_slot_counts_until_settled() {
        let ledger = Arc::new(PositionLedger::new(1));
        ledger.reserve(&AssetId::new("A")).unwrap().hold_unconfirmed();

        assert_eq!(ledger.open_count(), 0);
        assert_eq!(ledger.unconfirmed_count(), 1);
        assert!(matches!(
            ledger.reserve(&AssetId::new("B")),
            Err(PositionLimitError::LimitReached { occupied: 1, max: 1 })
        ));
        assert_eq!(
            ledger.reserve(&AssetId::new("A")).unwrap_err(),
            PositionLimitError::AlreadyOpen(AssetId::new("A"))
        );

        // A fetch that began before the hold does not settle it.
        ledger.reconcile(Vec::new(), 0);
        assert_eq!(ledger.unconfirmed_count(), 1);

        // The order did fill.
        ledger.reconcile(vec![position("A")], ledger.epoch());
        assert_eq!(ledger.unconfirmed_count(), 0);
        assert_eq!(ledger.open_count(), 1);
        assert!(ledger.reserve(&AssetId::new("B")).is_err());
    }

    #[test]
    fn test_unconfirmed_slot_released_when_venue_has_nothing() {
        let ledger = Arc::new(PositionLedger::new(1));
        ledger.reserve(&AssetId::new("A")).unwrap().hold_unconfirmed();

        ledger.reconcile(Vec::new(), ledger.epoch());

        assert_eq!(ledger.unconfirmed_count(), 0);
        assert!(ledger.reserve(&AssetId::new("B")).is_ok());
    }

    #[test]
    fn test_concurrent_reservations_respect_limit() {
        let ledger = Arc::new(PositionLedger::new(2));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger
                        .reserve(&AssetId::new(format!("A{i}")))
                        .ok()
                        .map(|slot| slot.commit(position(&format!("A{i}"))))
                })
            })
            .collect();
        let granted = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();
        assert_eq!(granted, 2);
        assert_eq!(ledger.open_count(), 2);
    }
}
