// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Agent Engine - Autonomous Decision Core
//!
//! An autonomous trading agent that turns market snapshots into risk-checked,
//! executed decisions.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: pure types and rules, no I/O
//!   - `shared`: identifiers, market snapshots, asset classes
//!   - `decision`: decisions, votes and the decision status lifecycle
//!   - `ensemble`: fallback-tier aggregation and weight learning
//!   - `risk`: limits, VaR/drawdown/correlation statistics, gatekeeper
//!   - `agent`: the agent state machine
//!
//! - **Application**: ports, services and orchestration
//!   - `ports`: market data, advisory providers, venue, decision store, approval
//!   - `services`: ensemble engine, position ledger, kill switch, portfolio
//!     tracker, provider weight book, position sizer
//!   - `orchestrator`: the per-asset agent loop
//!
//! - **Infrastructure**: adapters
//!   - `persistence`: in-memory and JSON-lines decision stores
//!   - `venue`: paper trading venue
//!   - `market_data`: snapshot replay
//!   - `advisors`: heuristic providers and the advisor registry
//!   - `approval`: channel approval gateway
//!
//! Cross-cutting: `resilience` (circuit breakers, retry), `config`, `error`,
//! `telemetry` and `observability`.

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Ports, services and the agent orchestrator.
pub mod application;

/// Infrastructure layer - Adapters for the application ports.
pub mod infrastructure;

// =============================================================================
// Cross-cutting concerns
// =============================================================================

/// Configuration loading and validation.
pub mod config;

/// Error taxonomy.
pub mod error;

/// Prometheus metrics.
pub mod observability;

/// Circuit breakers and retry.
pub mod resilience;

/// Tracing initialisation.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use application::orchestrator::{
    AgentOrchestrator, CycleOutcome, CycleReport, OrchestratorSettings, SharedResources,
};
pub use application::services::{EnsembleEngine, KillSwitch, PortfolioTracker, PositionLedger};
pub use config::{Config, ConfigError, load_config, load_config_from_string};
pub use domain::agent::{AgentState, AgentStateMachine};
pub use domain::decision::{Decision, DecisionStatus, FallbackTier, TradeAction};
pub use domain::risk::{RiskAssessment, RiskGatekeeper};
pub use error::{AgentError, ErrorCode, ErrorKind};
pub use resilience::{BreakerRegistry, CircuitBreaker, CircuitBreakerState};
