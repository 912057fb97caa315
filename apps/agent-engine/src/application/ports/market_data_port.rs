//! Market Data Port (Driven Port)
//!
//! Interface for fetching the latest snapshot of one asset.

use async_trait::async_trait;

use crate::domain::shared::{AssetId, MarketSnapshot};

/// Market data error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketDataError {
    /// Provider unreachable.
    #[error("Market data unavailable: {0}")]
    Unavailable(String),

    /// Provider only has data older than it is willing to serve.
    #[error("Snapshot for {asset} is {age_secs}s old")]
    Stale {
        /// Asset requested.
        asset: String,
        /// Age of the newest data.
        age_secs: u64,
    },

    /// Asset not known to the provider.
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// Request exceeded its deadline.
    #[error("Market data request timed out")]
    Timeout,
}

/// Port for fetching market snapshots.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Get the latest snapshot for `asset`.
    async fn get_snapshot(&self, asset: &AssetId) -> Result<MarketSnapshot, MarketDataError>;
}
