//! Prometheus metrics for the agent engine.
//!
//! Every `record_*` helper is a no-op until [`init_metrics`] installs the
//! exporter, so library code and tests may call them freely.
//!
//! # Example
//!
//! ```ignore
//! use agent_engine::observability::{init_metrics, record_cycle};
//!
//! init_metrics(&settings)?;
//! record_cycle("BTC-USD", "EXECUTED", 0.42);
//! ```

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsSettings;
use crate::resilience::CircuitBreakerState;

/// Latency buckets from 1ms to 30s.
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Invalid listen address or bucket configuration.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Initialize the Prometheus metrics exporter.
///
/// Starts an HTTP listener that exposes `/metrics`.
pub fn init_metrics(settings: &MetricsSettings) -> Result<(), MetricsError> {
    let addr: SocketAddr = settings
        .listen_addr
        .parse()
        .map_err(|e| MetricsError::Configuration(format!("{}: {e}", settings.listen_addr)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(LATENCY_BUCKETS)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}

// ============================================================================
// Cycle Metrics
// ============================================================================

/// Record a finished agent cycle.
///
/// * `asset` - Managed asset symbol
/// * `outcome` - Cycle outcome label (e.g., "EXECUTED", "HOLD", "ABORTED")
/// * `duration_seconds` - Wall time of the cycle
pub fn record_cycle(asset: &str, outcome: &'static str, duration_seconds: f64) {
    counter!(
        "agent_cycles_total",
        "asset" => asset.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("agent_cycle_duration_seconds", "asset" => asset.to_string())
        .record(duration_seconds);
}

/// Record an agent state transition.
pub fn record_state_transition(from: &'static str, to: &'static str) {
    counter!("agent_state_transitions_total", "from" => from, "to" => to).increment(1);
}

/// Record a cycle forced back to IDLE by an error.
pub fn record_cycle_abort(state: &'static str, kind: &'static str) {
    counter!("agent_cycle_aborts_total", "state" => state, "kind" => kind).increment(1);
}

// ============================================================================
// Ensemble Metrics
// ============================================================================

/// Record an ensemble decision.
pub fn record_decision(tier: &'static str, action: &'static str, confidence: f64) {
    counter!("ensemble_decisions_total", "tier" => tier, "action" => action).increment(1);
    histogram!("ensemble_decision_confidence", "tier" => tier).record(confidence);
}

/// Record an advisory provider that produced no vote.
pub fn record_provider_failure(provider: &str, reason: &'static str) {
    counter!(
        "ensemble_provider_failures_total",
        "provider" => provider.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// Record advisory provider latency.
pub fn record_provider_latency(provider: &str, latency_seconds: f64) {
    histogram!(
        "ensemble_provider_latency_seconds",
        "provider" => provider.to_string()
    )
    .record(latency_seconds);
}

// ============================================================================
// Risk and Position Metrics
// ============================================================================

/// Record a decision rejected by a risk check.
pub fn record_risk_rejection(check: &'static str) {
    counter!("risk_rejections_total", "check" => check).increment(1);
}

/// Update the open position gauge.
pub fn update_open_positions(count: usize) {
    gauge!("open_positions").set(count as f64);
}

/// Record a kill-switch trip.
pub fn record_kill_switch_trip(reason: &'static str) {
    counter!("kill_switch_trips_total", "reason" => reason).increment(1);
}

/// Record a venue execution attempt.
pub fn record_execution(venue: &str, status: &'static str, latency_seconds: f64) {
    counter!(
        "venue_executions_total",
        "venue" => venue.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!("venue_execution_latency_seconds", "venue" => venue.to_string())
        .record(latency_seconds);
}

// ============================================================================
// Circuit Breaker Metrics
// ============================================================================

/// Record a circuit breaker state change.
pub fn record_circuit_breaker_state(name: &str, state: CircuitBreakerState) {
    let value = match state {
        CircuitBreakerState::Closed => 0.0,
        CircuitBreakerState::HalfOpen => 1.0,
        CircuitBreakerState::Open => 2.0,
    };
    gauge!("circuit_breaker_state", "name" => name.to_string()).set(value);
    counter!("circuit_breaker_transitions_total", "name" => name.to_string()).increment(1);
}

/// Record a call rejected by an open breaker.
pub fn record_circuit_breaker_rejected(name: &str) {
    counter!("circuit_breaker_rejected_total", "name" => name.to_string()).increment(1);
}

/// Record the outcome of a call admitted by a breaker.
pub fn record_circuit_breaker_call(name: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        "circuit_breaker_calls_total",
        "name" => name.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_helpers_without_recorder() {
        record_cycle("BTC-USD", "HOLD", 0.1);
        record_state_transition("IDLE", "PERCEPTION");
        record_decision("WEIGHTED_VOTING", "BUY", 71.4);
        record_circuit_breaker_state("venue:paper", CircuitBreakerState::Open);
        update_open_positions(2);
    }

    #[test]
    fn test_invalid_listen_addr_is_rejected() {
        let settings = MetricsSettings {
            enabled: true,
            listen_addr: "not-an-address".to_string(),
        };
        assert!(matches!(
            init_metrics(&settings),
            Err(MetricsError::Configuration(_))
        ));
    }
}
