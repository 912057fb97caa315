//! Circuit breaker for external dependency calls.
//!
//! One breaker guards one dependency key (`market_data`, `venue:<id>`,
//! `advisor:<id>`). Breakers are shared by every orchestrator in the
//! process, so a failing venue is isolated uniformly across assets.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (consecutive failures >= threshold)
//! OPEN → HALF_OPEN (cooldown elapsed, next caller becomes the trial)
//! HALF_OPEN → CLOSED (trial call succeeds)
//! HALF_OPEN → OPEN (trial call fails, cooldown restarts)
//! ```
//!
//! All state lives behind a single mutex per breaker. While HALF_OPEN,
//! exactly one trial permit is handed out; concurrent callers are rejected
//! until the trial resolves.
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_engine::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("venue:paper", CircuitBreakerConfig::default());
//!
//! match breaker.call(|| venue.execute(&decision)).await {
//!     Ok(report) => { /* filled */ }
//!     Err(CircuitBreakerError::Open { .. }) => { /* fail fast */ }
//!     Err(CircuitBreakerError::Call(e)) => { /* venue error, counted */ }
//! }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without reaching the dependency.
    Open,
    /// One trial call is allowed through.
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time spent OPEN before a trial call is allowed.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration with a custom threshold and cooldown.
    #[must_use]
    pub const fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
        }
    }

    /// Configuration for market snapshot providers.
    ///
    /// Trips sooner and recovers faster; a stale feed is worse than none.
    #[must_use]
    pub const fn market_data() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }

    /// Configuration for trading venues.
    #[must_use]
    pub const fn venue() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }

    /// Configuration for advisory providers.
    #[must_use]
    pub const fn advisor() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(45),
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// Breaker rejected the call; the wrapped function was not invoked.
    #[error("circuit breaker '{name}' is open")]
    Open {
        /// Breaker name.
        name: String,
    },
    /// The wrapped function ran and failed.
    #[error(transparent)]
    Call(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the breaker rejected the call.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Get the inner call error, if the call ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Open { .. } => None,
            Self::Call(e) => Some(e),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    /// Bumped on every transition so outcomes of calls admitted under an
    /// earlier state do not drive the current one.
    generation: u64,
}

/// Circuit breaker for one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
    state_transitions: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the CLOSED state.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitBreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
                generation: 0,
            }),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
        }
    }

    /// Get the dependency name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current state.
    ///
    /// An OPEN breaker whose cooldown has elapsed reports HALF_OPEN.
    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        let inner = self.lock();
        if inner.state == CircuitBreakerState::Open && self.cooldown_elapsed(&inner) {
            CircuitBreakerState::HalfOpen
        } else {
            inner.state
        }
    }

    /// Current consecutive failure count.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn cooldown_elapsed(&self, inner: &BreakerInner) -> bool {
        inner
            .opened_at
            .is_some_and(|at| at.elapsed() >= self.config.cooldown)
    }

    /// Ask for permission to call the dependency.
    ///
    /// Returns `None` when the call must be rejected. The returned permit
    /// must be resolved with [`CallPermit::success`] or
    /// [`CallPermit::failure`]; a permit dropped unresolved while holding
    /// the HALF_OPEN trial counts as a failed trial.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.lock();
        let trial = match inner.state {
            CircuitBreakerState::Closed => false,
            CircuitBreakerState::Open => {
                if !self.cooldown_elapsed(&inner) {
                    drop(inner);
                    self.reject();
                    return None;
                }
                self.transition(&mut inner, CircuitBreakerState::HalfOpen);
                inner.trial_in_flight = true;
                true
            }
            CircuitBreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    drop(inner);
                    self.reject();
                    return None;
                }
                inner.trial_in_flight = true;
                true
            }
        };
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        Some(CallPermit {
            breaker: self,
            generation: inner.generation,
            trial,
            resolved: false,
        })
    }

    fn reject(&self) {
        self.total_rejections.fetch_add(1, Ordering::Relaxed);
        observability::record_circuit_breaker_rejected(&self.name);
        tracing::debug!(name = %self.name, "Circuit breaker rejected call");
    }

    /// Run `f` through the breaker.
    ///
    /// When the breaker is OPEN (or a HALF_OPEN trial is already in flight)
    /// `f` is never invoked and [`CircuitBreakerError::Open`] is returned.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.try_acquire() else {
            return Err(CircuitBreakerError::Open {
                name: self.name.clone(),
            });
        };

        match f().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(e) => {
                permit.failure();
                Err(CircuitBreakerError::Call(e))
            }
        }
    }

    /// Record a successful call against the current state.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        let generation = inner.generation;
        self.apply_success(&mut inner, generation);
    }

    /// Record a failed call against the current state.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        let generation = inner.generation;
        self.apply_failure(&mut inner, generation);
    }

    fn apply_success(&self, inner: &mut BreakerInner, generation: u64) {
        observability::record_circuit_breaker_call(&self.name, true);
        if generation != inner.generation {
            return;
        }
        match inner.state {
            CircuitBreakerState::Closed => inner.consecutive_failures = 0,
            CircuitBreakerState::HalfOpen => {
                self.transition(inner, CircuitBreakerState::Closed);
            }
            CircuitBreakerState::Open => {}
        }
    }

    fn apply_failure(&self, inner: &mut BreakerInner, generation: u64) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        observability::record_circuit_breaker_call(&self.name, false);
        if generation != inner.generation {
            return;
        }
        match inner.state {
            CircuitBreakerState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(inner, CircuitBreakerState::Open);
                }
            }
            CircuitBreakerState::HalfOpen => {
                self.transition(inner, CircuitBreakerState::Open);
            }
            CircuitBreakerState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitBreakerState) {
        let from = inner.state;
        inner.state = to;
        inner.generation = inner.generation.wrapping_add(1);
        inner.trial_in_flight = false;
        match to {
            CircuitBreakerState::Open => {
                inner.opened_at = Some(Instant::now());
                tracing::warn!(
                    name = %self.name,
                    from = %from,
                    failures = inner.consecutive_failures,
                    cooldown_secs = self.config.cooldown.as_secs_f64(),
                    "Circuit breaker opened"
                );
            }
            CircuitBreakerState::HalfOpen => {
                tracing::info!(name = %self.name, from = %from, "Circuit breaker half-open, allowing trial call");
            }
            CircuitBreakerState::Closed => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                tracing::info!(name = %self.name, from = %from, "Circuit breaker closed");
            }
        }
        self.state_transitions.fetch_add(1, Ordering::Relaxed);
        observability::record_circuit_breaker_state(&self.name, to);
    }

    /// Force the breaker OPEN (operator action).
    pub fn force_open(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitBreakerState::Open {
            self.transition(&mut inner, CircuitBreakerState::Open);
        } else {
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Force the breaker CLOSED and clear the failure count.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitBreakerState::Closed {
            self.transition(&mut inner, CircuitBreakerState::Closed);
        }
        inner.consecutive_failures = 0;
    }

    /// Snapshot of counters for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: self.state(),
            consecutive_failures: self.consecutive_failures(),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
        }
    }
}

/// Permission to make one call through a breaker.
#[derive(Debug)]
#[must_use = "a permit must be resolved with success() or failure()"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    resolved: bool,
}

impl CallPermit<'_> {
    /// Whether this permit is the HALF_OPEN trial.
    #[must_use]
    pub const fn is_trial(&self) -> bool {
        self.trial
    }

    /// Resolve the call as successful.
    pub fn success(mut self) {
        self.resolved = true;
        let mut inner = self.breaker.lock();
        self.breaker.apply_success(&mut inner, self.generation);
    }

    /// Resolve the call as failed.
    pub fn failure(mut self) {
        self.resolved = true;
        let mut inner = self.breaker.lock();
        self.breaker.apply_failure(&mut inner, self.generation);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.resolved || !self.trial {
            return;
        }
        // Abandoned trial (caller cancelled); treat as failed so the slot is freed.
        let mut inner = self.breaker.lock();
        self.breaker.apply_failure(&mut inner, self.generation);
    }
}

/// Point-in-time breaker counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerMetrics {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitBreakerState,
    /// Consecutive failures while CLOSED.
    pub consecutive_failures: u32,
    /// Calls admitted.
    pub total_calls: u64,
    /// Failed calls.
    pub total_failures: u64,
    /// Calls rejected while OPEN.
    pub total_rejections: u64,
    /// State transitions.
    pub state_transitions: u64,
}
