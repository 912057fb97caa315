//! Approval over an in-process channel.
//!
//! Each request is published as a [`PendingDecision`] carrying a oneshot
//! responder. Whoever holds the receiving end (a CLI prompt, an HTTP
//! handler, a test) answers by calling [`PendingDecision::approve`] or
//! [`PendingDecision::deny`]. Dropping the request unanswered abandons it.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::application::ports::{ApprovalError, ApprovalPort, ApprovalVerdict};
use crate::domain::decision::Decision;

/// A decision waiting for a verdict.
#[derive(Debug)]
pub struct PendingDecision {
    /// Snapshot of the decision under review.
    pub decision: Decision,
    responder: oneshot::Sender<ApprovalVerdict>,
}

impl PendingDecision {
    /// Answer with `verdict`. Returns `false` if the requester gave up.
    pub fn respond(self, verdict: ApprovalVerdict) -> bool {
        self.responder.send(verdict).is_ok()
    }

    /// Approve the decision.
    pub fn approve(self) -> bool {
        self.respond(ApprovalVerdict::Approved)
    }

    /// Deny the decision.
    pub fn deny(self, reason: impl Into<String>) -> bool {
        self.respond(ApprovalVerdict::Denied {
            reason: reason.into(),
        })
    }
}

/// [`ApprovalPort`] publishing requests on an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelApprovalGateway {
    requests: mpsc::Sender<PendingDecision>,
}

impl ChannelApprovalGateway {
    /// Create a gateway and the receiver reviewers listen on.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PendingDecision>) {
        let (requests, receiver) = mpsc::channel(buffer.max(1));
        (Self { requests }, receiver)
    }
}

#[async_trait]
impl ApprovalPort for ChannelApprovalGateway {
    async fn request_approval(&self, decision: &Decision) -> Result<ApprovalVerdict, ApprovalError> {
        let (responder, verdict) = oneshot::channel();
        self.requests
            .send(PendingDecision {
                decision: decision.clone(),
                responder,
            })
            .await
            .map_err(|_| ApprovalError::ChannelClosed)?;
        tracing::info!(decision_id = %decision.id, action = %decision.action, "Awaiting approval");
        verdict.await.map_err(|_| ApprovalError::Abandoned)
    }
}
