//! Approval Port (Driven Port)
//!
//! Optional human-in-the-loop gate between RISK_CHECK and EXECUTION. The
//! orchestrator applies the approval timeout; implementations may wait
//! indefinitely.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::decision::Decision;

/// Answer to an approval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalVerdict {
    /// Proceed to execution.
    Approved,
    /// Do not execute.
    Denied {
        /// Reviewer's reason.
        reason: String,
    },
}

/// Approval channel error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    /// Nobody is listening for approval requests.
    #[error("Approval channel closed")]
    ChannelClosed,

    /// Reviewer dropped the request without answering.
    #[error("Approval request abandoned")]
    Abandoned,
}

/// Port for requesting approval of a decision.
#[async_trait]
pub trait ApprovalPort: Send + Sync {
    /// Ask for approval of `decision` and wait for the verdict.
    async fn request_approval(&self, decision: &Decision) -> Result<ApprovalVerdict, ApprovalError>;
}
