//! Resilience patterns for external dependencies.
//!
//! - [`CircuitBreaker`]: consecutive-failure breaker, one per dependency key
//! - [`BreakerRegistry`]: process-wide map of breakers
//! - [`retry`]: exponential backoff for retryable errors

mod circuit_breaker;
mod registry;
mod retry;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics,
    CircuitBreakerState,
};
pub use registry::{BreakerRegistry, MARKET_DATA_KEY, advisor_key, venue_key};
pub use retry::{ExponentialBackoff, RetryPolicy, Retryable, retry};
