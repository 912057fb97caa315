//! Advisory Provider Port (Driven Port)
//!
//! One provider per ensemble member. Providers are queried concurrently; the
//! ensemble engine applies the per-provider timeout and breaker, so
//! implementations only produce a vote.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::decision::ProviderVote;
use crate::domain::risk::Position;
use crate::domain::shared::{MarketSnapshot, ProviderId};

/// Input shared by every provider in one round.
#[derive(Debug, Clone)]
pub struct AdvisoryContext {
    /// Snapshot being decided on.
    pub snapshot: Arc<MarketSnapshot>,
    /// Open position in the same asset, if any.
    pub open_position: Option<Position>,
}

impl AdvisoryContext {
    /// Context for a flat asset.
    #[must_use]
    pub fn new(snapshot: MarketSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            open_position: None,
        }
    }

    /// Attach the open position.
    #[must_use]
    pub fn with_position(mut self, position: Option<Position>) -> Self {
        self.open_position = position;
        self
    }
}

/// Advisory provider error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdvisoryError {
    /// No answer before the deadline.
    #[error("Advisory provider timed out")]
    Timeout,

    /// Provider unreachable.
    #[error("Advisory provider unavailable: {0}")]
    Unavailable(String),

    /// Provider answered with something unusable.
    #[error("Invalid advisory response: {0}")]
    InvalidResponse(String),
}

impl AdvisoryError {
    /// Label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// A member of the ensemble.
#[async_trait]
pub trait AdvisoryProvider: Send + Sync {
    /// Stable provider id, matching the configured weight key.
    fn id(&self) -> &ProviderId;

    /// Produce one vote for the snapshot in `context`.
    async fn query(&self, context: &AdvisoryContext) -> Result<ProviderVote, AdvisoryError>;
}
