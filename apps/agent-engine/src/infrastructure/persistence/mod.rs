//! Persistence Adapters
//!
//! Implementations of [`crate::application::ports::DecisionStore`].

mod in_memory;
mod jsonl;

pub use in_memory::InMemoryDecisionStore;
pub use jsonl::JsonlDecisionStore;
