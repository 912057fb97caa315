//! Observability module for metrics.
//!
//! Tracing setup lives in [`crate::telemetry`].

mod metrics;

pub use metrics::{
    MetricsError, init_metrics, record_circuit_breaker_call, record_circuit_breaker_rejected,
    record_circuit_breaker_state, record_cycle, record_cycle_abort, record_decision,
    record_execution, record_kill_switch_trip, record_provider_failure, record_provider_latency,
    record_risk_rejection, record_state_transition, update_open_positions,
};
