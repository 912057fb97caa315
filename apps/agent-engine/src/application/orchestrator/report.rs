//! What one cycle did.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::domain::agent::AgentState;
use crate::domain::decision::Decision;
use crate::domain::shared::{AssetId, CycleId};
use crate::error::ErrorCode;

/// How a cycle ended. The agent is always back in IDLE afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleOutcome {
    /// Decision filled at the venue.
    Executed,
    /// Ensemble decided HOLD.
    Held,
    /// Risk approved but no size was available.
    SignalOnly,
    /// Decision refused (risk check, position limit, approval, venue).
    Rejected {
        /// Refusal reason.
        reason: String,
    },
    /// Approval timed out.
    Expired,
    /// Kill switch tripped; no trading until reset.
    Halted,
    /// A step failed and the cycle was forced back to IDLE.
    Aborted {
        /// State that failed.
        state: AgentState,
        /// Error code.
        code: ErrorCode,
    },
}

impl CycleOutcome {
    /// Stable label for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Held => "held",
            Self::SignalOnly => "signal_only",
            Self::Rejected { .. } => "rejected",
            Self::Expired => "expired",
            Self::Halted => "halted",
            Self::Aborted { .. } => "aborted",
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { reason } => write!(f, "rejected: {reason}"),
            Self::Aborted { state, code } => write!(f, "aborted in {state}: {code}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Summary of one `process_cycle` call.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Cycle id.
    pub cycle_id: CycleId,
    /// Asset processed.
    pub asset: AssetId,
    /// How the cycle ended.
    pub outcome: CycleOutcome,
    /// Decision produced, with its final status.
    pub decision: Option<Decision>,
    /// States visited, starting and ending at IDLE.
    pub path: Vec<AgentState>,
    /// Whether the decision reached the store.
    pub persisted: bool,
    /// Wall-clock duration.
    pub duration: Duration,
}
