//! Trading Venue Port (Driven Port)
//!
//! Interface for executing decisions and reading account state. The
//! decision id doubles as the client order id, so a venue must treat a
//! repeated `execute` for the same decision as the same order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::decision::Decision;
use crate::domain::risk::Position;
use crate::domain::shared::{DecisionId, OrderId};
use crate::resilience::Retryable;

/// Fill confirmation from the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Venue order id.
    pub order_id: OrderId,
    /// Decision executed.
    pub decision_id: DecisionId,
    /// Quantity filled.
    pub filled_quantity: Decimal,
    /// Average fill price.
    pub fill_price: Decimal,
    /// Fill time.
    pub executed_at: DateTime<Utc>,
}

/// Account balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Cash plus marked positions.
    pub equity: Decimal,
    /// Cash balance.
    pub cash: Decimal,
    /// Available buying power.
    pub buying_power: Decimal,
}

/// Venue error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    /// Order refused by the venue.
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// Order malformed before submission.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Request exceeded its deadline.
    #[error("Venue request timed out")]
    Timeout,

    /// Venue unreachable.
    #[error("Venue unavailable: {0}")]
    Unavailable(String),

    /// Rate limited by the venue.
    #[error("Rate limited by venue")]
    RateLimited,
}

impl Retryable for VenueError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_) | Self::RateLimited)
    }
}

/// Port for venue interactions.
#[async_trait]
pub trait VenuePort: Send + Sync {
    /// Venue id, used as the breaker key suffix.
    fn venue_id(&self) -> &str;

    /// Execute a RISK_APPROVED decision at its recommended size.
    async fn execute(&self, decision: &Decision) -> Result<ExecutionReport, VenueError>;

    /// Positions currently open at the venue.
    async fn get_open_positions(&self) -> Result<Vec<Position>, VenueError>;

    /// Account balances.
    async fn get_account(&self) -> Result<AccountSnapshot, VenueError>;
}
