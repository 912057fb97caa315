//! Replays recorded snapshots as a market data feed.
//!
//! The source is a JSON array of snapshots. Each asset keeps its own cursor:
//! every request returns the next recorded snapshot for that asset, and the
//! last one repeats once the recording is exhausted. Timestamps are
//! re-stamped to the request time unless `preserve_timestamps` is set.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::application::ports::{MarketDataError, MarketDataPort};
use crate::domain::shared::{AssetId, MarketSnapshot};

#[derive(Debug)]
struct Tape {
    snapshots: Vec<MarketSnapshot>,
    cursor: usize,
}

impl Tape {
    fn next(&mut self) -> Option<MarketSnapshot> {
        let snapshot = self.snapshots.get(self.cursor)?.clone();
        if self.cursor + 1 < self.snapshots.len() {
            self.cursor += 1;
        }
        Some(snapshot)
    }
}

/// Error loading a replay file.
#[derive(Debug, thiserror::Error)]
pub enum ReplayLoadError {
    /// File could not be read.
    #[error("Failed to read replay file '{path}': {source}")]
    Read {
        /// Replay file path.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// File is not a JSON array of snapshots.
    #[error("Failed to parse replay file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// [`MarketDataPort`] backed by recorded snapshots.
#[derive(Debug)]
pub struct ReplaySnapshotProvider {
    tapes: Mutex<HashMap<AssetId, Tape>>,
    preserve_timestamps: bool,
}

impl ReplaySnapshotProvider {
    /// Build from snapshots in playback order.
    #[must_use]
    pub fn from_snapshots(snapshots: impl IntoIterator<Item = MarketSnapshot>) -> Self {
        let mut tapes: HashMap<AssetId, Tape> = HashMap::new();
        for snapshot in snapshots {
            tapes
                .entry(snapshot.asset.clone())
                .or_insert_with(|| Tape {
                    snapshots: Vec::new(),
                    cursor: 0,
                })
                .snapshots
                .push(snapshot);
        }
        Self {
            tapes: Mutex::new(tapes),
            preserve_timestamps: false,
        }
    }

    /// Load a JSON array of snapshots from `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReplayLoadError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ReplayLoadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let snapshots: Vec<MarketSnapshot> = serde_json::from_str(&contents)?;
        tracing::info!(path = %path.display(), snapshots = snapshots.len(), "Replay loaded");
        Ok(Self::from_snapshots(snapshots))
    }

    /// Serve recorded timestamps instead of the request time.
    #[must_use]
    pub const fn preserve_timestamps(mut self, preserve: bool) -> Self {
        self.preserve_timestamps = preserve;
        self
    }

    /// Assets with at least one recorded snapshot.
    #[must_use]
    pub fn assets(&self) -> Vec<AssetId> {
        let tapes = self.tapes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut assets: Vec<_> = tapes.keys().cloned().collect();
        assets.sort();
        assets
    }
}

#[async_trait]
impl MarketDataPort for ReplaySnapshotProvider {
    async fn get_snapshot(&self, asset: &AssetId) -> Result<MarketSnapshot, MarketDataError> {
        let mut snapshot = {
            let mut tapes = self.tapes.lock().unwrap_or_else(PoisonError::into_inner);
            tapes
                .get_mut(asset)
                .and_then(Tape::next)
                .ok_or_else(|| MarketDataError::UnknownAsset(asset.to_string()))?
        };
        if !self.preserve_timestamps {
            snapshot.timestamp = Utc::now();
        }
        Ok(snapshot)
    }
}
