//! Decision Store Port (Driven Port)
//!
//! Append-only persistence keyed by decision id. Stored statuses only move
//! forward through the decision lifecycle.

use async_trait::async_trait;

use crate::domain::decision::{Decision, DecisionStatus, DecisionStatusError};
use crate::domain::shared::DecisionId;

/// Persistence error.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Storage I/O failed.
    #[error("Decision store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded.
    #[error("Decision store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No decision with this id.
    #[error("Decision not found: {0}")]
    NotFound(DecisionId),

    /// Stored status would move backwards.
    #[error(transparent)]
    IllegalStatus(#[from] DecisionStatusError),
}

/// Port for persisting decisions.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Store `decision`, replacing an earlier record with the same id.
    ///
    /// A replacement must carry the stored status or a legal successor.
    async fn record(&self, decision: Decision) -> Result<(), PersistenceError>;

    /// Advance the stored status of `id`.
    async fn advance_status(
        &self,
        id: &DecisionId,
        status: DecisionStatus,
    ) -> Result<Decision, PersistenceError>;

    /// Latest record for `id`.
    async fn get(&self, id: &DecisionId) -> Result<Option<Decision>, PersistenceError>;

    /// All records in insertion order.
    async fn list(&self) -> Result<Vec<Decision>, PersistenceError>;
}
