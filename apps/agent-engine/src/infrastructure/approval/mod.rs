//! Approval Adapters

mod channel;

pub use channel::{ChannelApprovalGateway, PendingDecision};
