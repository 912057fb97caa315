//! In-memory decision store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::application::ports::{DecisionStore, PersistenceError};
use crate::domain::decision::{Decision, DecisionStatus, DecisionStatusError};
use crate::domain::shared::DecisionId;

#[derive(Debug, Default)]
struct Records {
    order: Vec<DecisionId>,
    by_id: HashMap<DecisionId, Decision>,
}

/// In-memory implementation of [`DecisionStore`].
///
/// Suitable for testing and paper runs. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryDecisionStore {
    records: RwLock<Records>,
}

impl InMemoryDecisionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reject a replacement whose status would move backwards.
pub(super) fn check_forward(
    stored: &Decision,
    incoming: &Decision,
) -> Result<(), DecisionStatusError> {
    let (from, to) = (stored.status(), incoming.status());
    if from == to || from.can_transition_to(to) {
        return Ok(());
    }
    Err(DecisionStatusError {
        id: stored.id.clone(),
        from,
        to,
    })
}

#[async_trait]
impl DecisionStore for InMemoryDecisionStore {
    async fn record(&self, decision: Decision) -> Result<(), PersistenceError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.by_id.get(&decision.id) {
            Some(stored) => check_forward(stored, &decision)?,
            None => records.order.push(decision.id.clone()),
        }
        records.by_id.insert(decision.id.clone(), decision);
        Ok(())
    }

    async fn advance_status(
        &self,
        id: &DecisionId,
        status: DecisionStatus,
    ) -> Result<Decision, PersistenceError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let decision = records
            .by_id
            .get_mut(id)
            .ok_or_else(|| PersistenceError::NotFound(id.clone()))?;
        decision.advance(status)?;
        Ok(decision.clone())
    }

    async fn get(&self, id: &DecisionId) -> Result<Option<Decision>, PersistenceError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.by_id.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Decision>, PersistenceError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .order
            .iter()
            .filter_map(|id| records.by_id.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::TradeAction;
    use crate::domain::decision::fixtures::sized_decision;
    use crate::domain::shared::AssetClass;
    use crate::domain::shared::fixtures::snapshot_with_closes;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn decision() -> Decision {
        let snap = snapshot_with_closes("BTC-USD", AssetClass::Crypto, dec!(100), Utc::now(), &[]);
        sized_decision(&snap, TradeAction::Buy, Some(dec!(1)))
    }

    #[tokio::test]
    async fn test_record_is_an_upsert() {
        let store = InMemoryDecisionStore::new();
        let mut d = decision();
        store.record(d.clone()).await.unwrap();
        d.advance(DecisionStatus::RiskApproved).unwrap();
        store.record(d.clone()).await.unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.get(&d.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), DecisionStatus::RiskApproved);
    }

    #[tokio::test]
    async fn test_status_never_moves_backwards() {
        let store = InMemoryDecisionStore::new();
        let mut d = decision();
        let proposed = d.clone();
        d.advance(DecisionStatus::Rejected).unwrap();
        store.record(d.clone()).await.unwrap();

        let err = store.record(proposed).await.unwrap_err();
        assert!(matches!(err, PersistenceError::IllegalStatus(_)));
        let err = store
            .advance_status(&d.id, DecisionStatus::Executed)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::IllegalStatus(_)));
        assert_eq!(
            store.get(&d.id).await.unwrap().unwrap().status(),
            DecisionStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order() {
        let store = InMemoryDecisionStore::new();
        let first = decision();
        let second = decision();
        store.record(first.clone()).await.unwrap();
        store.record(second.clone()).await.unwrap();
        store.record(first.clone()).await.unwrap();

        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_advance_unknown_decision() {
        let store = InMemoryDecisionStore::new();
        let err = store
            .advance_status(&DecisionId::new("missing"), DecisionStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }
}
