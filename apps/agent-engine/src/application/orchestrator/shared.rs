//! Resources shared by every orchestrator in the process, and per-agent
//! settings.

use std::sync::Arc;
use std::time::Duration;

use crate::application::services::{
    EnsembleEngine, KillSwitch, PortfolioTracker, PositionLedger, PositionSizer,
};
use crate::config::Config;
use crate::domain::risk::RiskGatekeeper;
use crate::resilience::{BreakerRegistry, RetryPolicy};

/// Process-wide collaborators. Cloning shares the same instances.
#[derive(Debug, Clone)]
pub struct SharedResources {
    /// Ensemble engine and its provider weights.
    pub engine: Arc<EnsembleEngine>,
    /// Risk gatekeeper.
    pub gatekeeper: Arc<RiskGatekeeper>,
    /// Open positions and slot reservations.
    pub ledger: Arc<PositionLedger>,
    /// Breakers keyed by dependency.
    pub breakers: Arc<BreakerRegistry>,
    /// Latched kill switch.
    pub kill_switch: Arc<KillSwitch>,
    /// Equity curve, marks and returns.
    pub tracker: Arc<PortfolioTracker>,
}

/// Per-agent timeouts, guard and sizing.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// State transitions allowed within one cycle.
    pub max_transitions: u32,
    /// Deadline for one snapshot fetch.
    pub snapshot_timeout: Duration,
    /// Deadline for one venue call.
    pub venue_timeout: Duration,
    /// How long to wait for a human verdict.
    pub approval_timeout: Duration,
    /// Venue execution retry policy.
    pub retry: RetryPolicy,
    /// Position sizer.
    pub sizer: PositionSizer,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_transitions: 12,
            snapshot_timeout: Duration::from_secs(5),
            venue_timeout: Duration::from_secs(10),
            approval_timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            sizer: PositionSizer::new(0.1, 6),
        }
    }
}

impl OrchestratorSettings {
    /// Settings taken from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_transitions: config.agent.max_transitions,
            snapshot_timeout: config.agent.snapshot_timeout(),
            venue_timeout: config.agent.venue_timeout(),
            approval_timeout: config.agent.approval_timeout(),
            retry: config.retry.to_policy(),
            sizer: PositionSizer::new(
                config.risk.max_position_fraction,
                config.risk.quantity_precision,
            ),
        }
    }
}
