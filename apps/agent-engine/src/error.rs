//! Error taxonomy for the agent engine.
//!
//! Every failure raised on the cycle path is classified into an
//! [`ErrorKind`], which decides how the orchestrator reacts:
//!
//! | Kind | Examples | Reaction |
//! |------|----------|----------|
//! | `TRANSIENT` | timeout, rate limit, breaker open | abort cycle to IDLE, breaker absorbs repeats |
//! | `DATA_QUALITY` | stale snapshot, unknown asset | conservative fallback or reject |
//! | `INVARIANT_VIOLATION` | illegal transition, position limit, bad quorum | abort cycle to IDLE with context |
//! | `PARTIAL_ENSEMBLE` | some providers failed | never fatal, degraded decision |
//! | `REJECTED` | venue rejection, kill switch | decision reaches a terminal status |
//! | `CANCELLED` | shutdown signal | abort cycle to IDLE |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::{
    AdvisoryError, ApprovalError, MarketDataError, PersistenceError, VenueError,
};
use crate::application::services::PositionLimitError;
use crate::domain::agent::StateTransitionError;
use crate::domain::decision::DecisionStatusError;
use crate::domain::ensemble::EnsembleError;
use crate::resilience::CircuitBreakerError;

/// Classification of a failure by recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Dependency hiccup, recovered locally by breakers and retries.
    Transient,
    /// Bad or missing data, handled by conservative fallback.
    DataQuality,
    /// Broken invariant, fatal for the current cycle.
    InvariantViolation,
    /// Some advisory providers failed.
    PartialEnsemble,
    /// A business rejection that terminates the decision.
    Rejected,
    /// External stop signal observed.
    Cancelled,
}

impl ErrorKind {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "TRANSIENT",
            Self::DataQuality => "DATA_QUALITY",
            Self::InvariantViolation => "INVARIANT_VIOLATION",
            Self::PartialEnsemble => "PARTIAL_ENSEMBLE",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes raised on the agent cycle path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Transient
    /// Market snapshot provider unreachable or timed out.
    SnapshotUnavailable,
    /// Circuit breaker rejected the call.
    BreakerOpen,
    /// Trading venue unreachable or timed out.
    VenueUnavailable,
    /// Persistence collaborator failed.
    PersistenceFailed,
    /// Approval channel failed.
    ApprovalFailed,
    /// Open positions could not be recovered from the venue.
    RecoveryFailed,

    // Data quality
    /// Snapshot older than the freshness threshold.
    SnapshotStale,
    /// Asset not known to the data provider.
    UnknownAsset,

    // Invariant violations
    /// Requested state transition is not in the transition table.
    IllegalTransition,
    /// Decision status would move backwards.
    IllegalStatusChange,
    /// Position limit reached.
    PositionLimitExceeded,
    /// Ensemble quorum or weights misconfigured.
    MisconfiguredEnsemble,
    /// Cycle exceeded its transition budget.
    IterationGuardExceeded,

    // Partial ensemble
    /// An advisory provider produced no vote.
    ProviderFailed,

    // Rejections
    /// Venue refused the order.
    VenueRejected,
    /// Kill switch latched.
    KillSwitchTripped,

    /// Stop signal received.
    Cancelled,
}

impl ErrorCode {
    /// Get the error reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::SnapshotUnavailable => "SNAPSHOT_UNAVAILABLE",
            Self::BreakerOpen => "BREAKER_OPEN",
            Self::VenueUnavailable => "VENUE_UNAVAILABLE",
            Self::PersistenceFailed => "PERSISTENCE_FAILED",
            Self::ApprovalFailed => "APPROVAL_FAILED",
            Self::RecoveryFailed => "RECOVERY_FAILED",
            Self::SnapshotStale => "SNAPSHOT_STALE",
            Self::UnknownAsset => "UNKNOWN_ASSET",
            Self::IllegalTransition => "ILLEGAL_TRANSITION",
            Self::IllegalStatusChange => "ILLEGAL_STATUS_CHANGE",
            Self::PositionLimitExceeded => "POSITION_LIMIT_EXCEEDED",
            Self::MisconfiguredEnsemble => "MISCONFIGURED_ENSEMBLE",
            Self::IterationGuardExceeded => "ITERATION_GUARD_EXCEEDED",
            Self::ProviderFailed => "PROVIDER_FAILED",
            Self::VenueRejected => "VENUE_REJECTED",
            Self::KillSwitchTripped => "KILL_SWITCH_TRIPPED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Recovery class of this code.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SnapshotUnavailable
            | Self::BreakerOpen
            | Self::VenueUnavailable
            | Self::PersistenceFailed
            | Self::ApprovalFailed
            | Self::RecoveryFailed => ErrorKind::Transient,

            Self::SnapshotStale | Self::UnknownAsset => ErrorKind::DataQuality,

            Self::IllegalTransition
            | Self::IllegalStatusChange
            | Self::PositionLimitExceeded
            | Self::MisconfiguredEnsemble
            | Self::IterationGuardExceeded => ErrorKind::InvariantViolation,

            Self::ProviderFailed => ErrorKind::PartialEnsemble,

            Self::VenueRejected | Self::KillSwitchTripped => ErrorKind::Rejected,

            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// A rich error with context, raised by orchestrator steps.
#[derive(Debug, Error)]
pub struct AgentError {
    code: ErrorCode,
    message: String,
    context: Vec<(String, String)>,
}

impl AgentError {
    /// Create a new agent error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Add context to the error.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }

    /// Get the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the recovery class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Get the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the context.
    #[must_use]
    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    /// Stop signal observed between states.
    #[must_use]
    pub fn cancelled(state: impl ToString) -> Self {
        Self::new(ErrorCode::Cancelled, "stop signal received").with_context("state", state)
    }
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.reason(), self.message)?;
        if !self.context.is_empty() {
            let pairs: Vec<String> = self
                .context
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, " ({})", pairs.join(", "))?;
        }
        Ok(())
    }
}

impl From<StateTransitionError> for AgentError {
    fn from(err: StateTransitionError) -> Self {
        Self::new(ErrorCode::IllegalTransition, err.to_string())
            .with_context("from", err.from)
            .with_context("to", err.to)
    }
}

impl From<DecisionStatusError> for AgentError {
    fn from(err: DecisionStatusError) -> Self {
        Self::new(ErrorCode::IllegalStatusChange, err.to_string())
    }
}

impl From<PositionLimitError> for AgentError {
    fn from(err: PositionLimitError) -> Self {
        Self::new(ErrorCode::PositionLimitExceeded, err.to_string())
    }
}

impl From<EnsembleError> for AgentError {
    fn from(err: EnsembleError) -> Self {
        Self::new(ErrorCode::MisconfiguredEnsemble, err.to_string())
    }
}

impl From<MarketDataError> for AgentError {
    fn from(err: MarketDataError) -> Self {
        let code = match &err {
            MarketDataError::Stale { .. } => ErrorCode::SnapshotStale,
            MarketDataError::UnknownAsset(_) => ErrorCode::UnknownAsset,
            MarketDataError::Unavailable(_) | MarketDataError::Timeout => {
                ErrorCode::SnapshotUnavailable
            }
        };
        Self::new(code, err.to_string())
    }
}

impl From<VenueError> for AgentError {
    fn from(err: VenueError) -> Self {
        let code = match &err {
            VenueError::Rejected(_) | VenueError::InvalidOrder(_) => ErrorCode::VenueRejected,
            VenueError::Timeout | VenueError::Unavailable(_) | VenueError::RateLimited => {
                ErrorCode::VenueUnavailable
            }
        };
        Self::new(code, err.to_string())
    }
}

impl From<AdvisoryError> for AgentError {
    fn from(err: AdvisoryError) -> Self {
        Self::new(ErrorCode::ProviderFailed, err.to_string())
    }
}

impl From<PersistenceError> for AgentError {
    fn from(err: PersistenceError) -> Self {
        Self::new(ErrorCode::PersistenceFailed, err.to_string())
    }
}

impl From<ApprovalError> for AgentError {
    fn from(err: ApprovalError) -> Self {
        Self::new(ErrorCode::ApprovalFailed, err.to_string())
    }
}

impl<E> From<CircuitBreakerError<E>> for AgentError
where
    E: Into<Self>,
{
    fn from(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::Open { name } => {
                Self::new(ErrorCode::BreakerOpen, "circuit breaker open").with_context("breaker", name)
            }
            CircuitBreakerError::Call(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentState;

    #[test]
    fn test_display_includes_reason_and_context() {
        let err = AgentError::new(ErrorCode::SnapshotStale, "snapshot too old")
            .with_context("asset", "BTC-USD")
            .with_context("age_secs", 900);
        assert_eq!(
            err.to_string(),
            "[SNAPSHOT_STALE] snapshot too old (asset=BTC-USD, age_secs=900)"
        );
        assert_eq!(err.kind(), ErrorKind::DataQuality);
    }

    #[test]
    fn test_breaker_open_is_transient() {
        let err: AgentError = CircuitBreakerError::<VenueError>::Open {
            name: "venue:paper".to_string(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::BreakerOpen);
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(err.context()[0].1, "venue:paper");
    }

    #[test]
    fn test_breaker_call_error_keeps_inner_classification() {
        let err: AgentError =
            CircuitBreakerError::Call(VenueError::Rejected("insufficient funds".into())).into();
        assert_eq!(err.code(), ErrorCode::VenueRejected);
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }

    #[test]
    fn test_illegal_transition_is_invariant_violation() {
        let err: AgentError = StateTransitionError {
            from: AgentState::Idle,
            to: AgentState::Execution,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_error_codes_have_unique_reasons() {
        let codes = [
            ErrorCode::SnapshotUnavailable,
            ErrorCode::BreakerOpen,
            ErrorCode::VenueUnavailable,
            ErrorCode::PersistenceFailed,
            ErrorCode::ApprovalFailed,
            ErrorCode::RecoveryFailed,
            ErrorCode::SnapshotStale,
            ErrorCode::UnknownAsset,
            ErrorCode::IllegalTransition,
            ErrorCode::IllegalStatusChange,
            ErrorCode::PositionLimitExceeded,
            ErrorCode::MisconfiguredEnsemble,
            ErrorCode::IterationGuardExceeded,
            ErrorCode::ProviderFailed,
            ErrorCode::VenueRejected,
            ErrorCode::KillSwitchTripped,
            ErrorCode::Cancelled,
        ];
        let reasons: std::collections::HashSet<_> = codes.iter().map(ErrorCode::reason).collect();
        assert_eq!(reasons.len(), codes.len());
    }
}
