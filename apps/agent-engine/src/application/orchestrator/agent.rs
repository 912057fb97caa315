//! Agent Orchestrator
//!
//! One orchestrator per asset. [`AgentOrchestrator::process_cycle`] runs a
//! single cycle from IDLE back to IDLE:
//!
//! ```text
//! IDLE → [RECOVERING] → PERCEPTION → REASONING ─┬→ IDLE (HOLD, kill switch)
//!                                               └→ RISK_CHECK ─┬→ IDLE (rejected, signal-only,
//!                                                              │        limit, approval)
//!                                                              └→ EXECUTION → LEARNING → IDLE
//! ```
//!
//! RECOVERING runs on the first cycle, again after a failed recovery and
//! after any execution whose outcome is unknown (timeout, outage, open
//! breaker), reconciling the shared position ledger with the venue. An
//! unknown execution keeps its position slot until that reconciliation.
//! Equity is refreshed from the venue before the kill switch is evaluated,
//! falling back to marking open positions at snapshot prices. Every step is
//! raced against the cancellation token, and any error forces the machine
//! back to IDLE with the failing state and error kind logged. The number of
//! transitions per cycle is bounded by `max_transitions`.
//!
//! The decision is persisted right after a fill and again when the cycle
//! ends, whatever the outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::report::{CycleOutcome, CycleReport};
use super::shared::{OrchestratorSettings, SharedResources};
use crate::application::ports::{
    AccountSnapshot, AdvisoryContext, ApprovalPort, ApprovalVerdict, DecisionStore,
    ExecutionReport, MarketDataError, MarketDataPort, VenueError, VenuePort,
};
use crate::domain::agent::{AgentState, AgentStateMachine};
use crate::domain::decision::{Decision, DecisionStatus, TradeAction};
use crate::domain::risk::{Position, PositionSide, TradeIntent, TradeOutcome};
use crate::domain::shared::{AssetId, CycleId, MarketSnapshot};
use crate::error::{AgentError, ErrorCode};
use crate::observability;
use crate::resilience::{CircuitBreakerError, MARKET_DATA_KEY, retry, venue_key};

/// Per-cycle bookkeeping.
#[derive(Debug, Default)]
struct CycleTrace {
    transitions: u32,
    path: Vec<AgentState>,
}

/// Drives one asset through the agent state machine.
pub struct AgentOrchestrator<M, V, S>
where
    M: MarketDataPort + ?Sized,
    V: VenuePort + ?Sized,
    S: DecisionStore + ?Sized,
{
    asset: AssetId,
    machine: AgentStateMachine,
    needs_recovery: bool,
    trace: CycleTrace,
    shared: SharedResources,
    market_data: Arc<M>,
    venue: Arc<V>,
    store: Arc<S>,
    approval: Option<Arc<dyn ApprovalPort>>,
    settings: OrchestratorSettings,
    cancel: CancellationToken,
}

impl<M, V, S> AgentOrchestrator<M, V, S>
where
    M: MarketDataPort + ?Sized,
    V: VenuePort + ?Sized,
    S: DecisionStore + ?Sized,
{
    /// Create an orchestrator in IDLE that recovers on its first cycle.
    pub fn new(
        asset: AssetId,
        shared: SharedResources,
        market_data: Arc<M>,
        venue: Arc<V>,
        store: Arc<S>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            asset,
            machine: AgentStateMachine::new(),
            needs_recovery: true,
            trace: CycleTrace::default(),
            shared,
            market_data,
            venue,
            store,
            approval: None,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Require a human verdict before every execution.
    #[must_use]
    pub fn with_approval(mut self, approval: Arc<dyn ApprovalPort>) -> Self {
        self.approval = Some(approval);
        self
    }

    /// Observe `token` between and during steps.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Asset this agent trades.
    #[must_use]
    pub const fn asset(&self) -> &AssetId {
        &self.asset
    }

    /// Current state; IDLE between cycles.
    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.machine.current()
    }

    /// Whether the next cycle starts with RECOVERING.
    #[must_use]
    pub const fn needs_recovery(&self) -> bool {
        self.needs_recovery
    }

    /// Run cycles every `interval` until cancelled.
    pub async fn run(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(asset = %self.asset, interval_secs = interval.as_secs(), "Agent started");

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let report = self.process_cycle().await;
            if report.outcome == CycleOutcome::Halted {
                tracing::warn!(asset = %self.asset, "Agent halted by kill switch, waiting for reset");
            }
        }

        tracing::info!(asset = %self.asset, "Agent stopped");
    }

    /// Run one cycle from IDLE back to IDLE.
    pub async fn process_cycle(&mut self) -> CycleReport {
        let cycle_id = CycleId::generate();
        let span = tracing::info_span!("agent_cycle", asset = %self.asset, cycle_id = %cycle_id);
        self.run_cycle(cycle_id).instrument(span).await
    }

    async fn run_cycle(&mut self, cycle_id: CycleId) -> CycleReport {
        let started = Instant::now();
        self.trace = CycleTrace {
            transitions: 0,
            path: vec![self.machine.current()],
        };

        let mut slot = None;
        let outcome = match self.drive(&mut slot).await {
            Ok(outcome) => outcome,
            Err(err) => self.abort(&mut slot, &err),
        };

        let persisted = match &slot {
            Some(decision) => self.persist(decision).await,
            None => false,
        };

        let duration = started.elapsed();
        observability::record_cycle(self.asset.as_str(), outcome.as_str(), duration.as_secs_f64());
        tracing::info!(
            outcome = %outcome,
            decision_id = ?slot.as_ref().map(|d| d.id.as_str()),
            status = ?slot.as_ref().map(|d| d.status().as_str()),
            duration_ms = duration.as_millis() as u64,
            "Cycle finished"
        );

        CycleReport {
            cycle_id,
            asset: self.asset.clone(),
            outcome,
            decision: slot,
            path: std::mem::take(&mut self.trace.path),
            persisted,
            duration,
        }
    }

    async fn drive(&mut self, slot: &mut Option<Decision>) -> Result<CycleOutcome, AgentError> {
        if self.shared.kill_switch.is_tripped() {
            return Ok(CycleOutcome::Halted);
        }

        if self.needs_recovery {
            self.advance(AgentState::Recovering)?;
            let cancel = self.cancel.clone();
            until_cancelled(&cancel, AgentState::Recovering, self.recover()).await?;
            self.needs_recovery = false;
        }

        self.advance(AgentState::Perception)?;
        let cancel = self.cancel.clone();
        let snapshot = until_cancelled(&cancel, AgentState::Perception, self.perceive()).await?;

        self.advance(AgentState::Reasoning)?;
        let decision = until_cancelled(&cancel, AgentState::Reasoning, self.reason(snapshot)).await?;
        let decision = slot.insert(decision);

        if decision.action == TradeAction::Hold {
            self.advance(AgentState::Idle)?;
            return Ok(CycleOutcome::Held);
        }

        let tracker = Arc::clone(&self.shared.tracker);
        if let Some(trip) = self
            .shared
            .kill_switch
            .evaluate(tracker.drawdown_from_peak(), tracker.realized_pnl())
        {
            decision.advance(DecisionStatus::Rejected)?;
            tracing::error!(
                decision_id = %decision.id,
                reason = %trip.reason,
                value = trip.value,
                "Decision rejected by kill switch"
            );
            self.advance(AgentState::Idle)?;
            return Ok(CycleOutcome::Halted);
        }

        self.advance(AgentState::RiskCheck)?;
        let portfolio = tracker.portfolio_state(self.shared.ledger.positions());
        let assessment = self.shared.gatekeeper.validate(decision, &portfolio, Utc::now());
        let intent = assessment.intent;
        let rejection = assessment.rejection;
        decision.attach_risk(assessment);

        if let Some(check) = rejection {
            decision.advance(DecisionStatus::Rejected)?;
            observability::record_risk_rejection(check.as_str());
            tracing::warn!(decision_id = %decision.id, check = %check, "Decision rejected by risk");
            self.advance(AgentState::Idle)?;
            return Ok(CycleOutcome::Rejected {
                reason: format!("risk check {check} failed"),
            });
        }
        decision.advance(DecisionStatus::RiskApproved)?;

        if decision.is_signal_only() {
            tracing::info!(decision_id = %decision.id, "Signal-only decision, nothing to execute");
            self.advance(AgentState::Idle)?;
            return Ok(CycleOutcome::SignalOnly);
        }

        let reservation = if intent == TradeIntent::Open {
            match self.shared.ledger.reserve(&self.asset) {
                Ok(reservation) => Some(reservation),
                Err(err) => {
                    decision.advance(DecisionStatus::Rejected)?;
                    tracing::warn!(
                        decision_id = %decision.id,
                        error = %AgentError::from(err.clone()),
                        "Execution refused"
                    );
                    self.advance(AgentState::Idle)?;
                    return Ok(CycleOutcome::Rejected {
                        reason: err.to_string(),
                    });
                }
            }
        } else {
            None
        };

        if let Some(approval) = self.approval.clone() {
            let verdict = until_cancelled(
                &cancel,
                AgentState::RiskCheck,
                self.await_approval(approval.as_ref(), decision),
            )
            .await?;
            match verdict {
                Some(ApprovalVerdict::Approved) => {}
                Some(ApprovalVerdict::Denied { reason }) => {
                    decision.advance(DecisionStatus::Rejected)?;
                    tracing::info!(decision_id = %decision.id, reason = %reason, "Approval denied");
                    self.advance(AgentState::Idle)?;
                    return Ok(CycleOutcome::Rejected {
                        reason: format!("approval denied: {reason}"),
                    });
                }
                None => {
                    decision.advance(DecisionStatus::Expired)?;
                    tracing::warn!(decision_id = %decision.id, "Approval timed out");
                    self.advance(AgentState::Idle)?;
                    return Ok(CycleOutcome::Expired);
                }
            }
        }

        self.advance(AgentState::Execution)?;
        let executed = until_cancelled(&cancel, AgentState::Execution, self.execute(decision)).await;
        let report = match executed {
            Ok(Ok(report)) => report,
            Ok(Err(reason)) => {
                decision.advance(DecisionStatus::Rejected)?;
                tracing::warn!(decision_id = %decision.id, reason = %reason, "Venue rejected order");
                self.advance(AgentState::Idle)?;
                return Ok(CycleOutcome::Rejected { reason });
            }
            Err(err) => {
                // The order may have filled before the error surfaced.
                if let Some(reservation) = reservation {
                    reservation.hold_unconfirmed();
                }
                self.needs_recovery = true;
                tracing::warn!(
                    decision_id = %decision.id,
                    "Execution outcome unknown, positions will be reconciled next cycle"
                );
                return Err(err);
            }
        };
        decision.advance(DecisionStatus::Executed)?;
        self.persist(decision).await;

        self.advance(AgentState::Learning)?;
        match reservation {
            Some(reservation) => {
                let side = PositionSide::opened_by(decision.action).unwrap_or(PositionSide::Long);
                reservation.commit(Position {
                    asset: self.asset.clone(),
                    side,
                    quantity: report.filled_quantity,
                    entry_price: report.fill_price,
                    opened_at: report.executed_at,
                    decision_id: Some(decision.id.clone()),
                    attribution: decision.ensemble_metadata.votes.clone(),
                });
            }
            None => self.settle_close(decision, &report),
        }
        if let Ok(account) = self.fetch_account().await {
            self.shared.tracker.record_account(&account);
        }

        self.advance(AgentState::Idle)?;
        Ok(CycleOutcome::Executed)
    }

    fn advance(&mut self, to: AgentState) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::cancelled(self.machine.current()));
        }
        if self.trace.transitions >= self.settings.max_transitions {
            return Err(AgentError::new(
                ErrorCode::IterationGuardExceeded,
                "too many state transitions in one cycle",
            )
            .with_context("limit", self.settings.max_transitions)
            .with_context("requested", to));
        }
        let from = self.machine.transition(to)?;
        self.trace.transitions += 1;
        self.trace.path.push(to);
        observability::record_state_transition(from.as_str(), to.as_str());
        tracing::debug!(from = %from, to = %to, "State transition");
        Ok(())
    }

    fn abort(&mut self, slot: &mut Option<Decision>, err: &AgentError) -> CycleOutcome {
        let state = self.machine.current();
        tracing::error!(
            state = %state,
            kind = %err.kind(),
            code = %err.code(),
            error = %err,
            "Cycle aborted, returning to IDLE"
        );
        observability::record_cycle_abort(state.as_str(), err.kind().as_str());

        if let Some(decision) = slot.as_mut()
            && err.code() != ErrorCode::Cancelled
            && decision.status() != DecisionStatus::Executed
            && decision.status().can_transition_to(DecisionStatus::Failed)
            && decision.advance(DecisionStatus::Failed).is_ok()
        {
            tracing::warn!(decision_id = %decision.id, "Decision marked FAILED");
        }

        if let Some(from) = self.machine.abort_to_idle() {
            self.trace.path.push(AgentState::Idle);
            observability::record_state_transition(from.as_str(), AgentState::Idle.as_str());
        }

        CycleOutcome::Aborted {
            state,
            code: err.code(),
        }
    }

    async fn recover(&self) -> Result<(), AgentError> {
        let breaker = self.shared.breakers.get(&venue_key(self.venue.venue_id()));
        let venue = self.venue.as_ref();
        let timeout = self.settings.venue_timeout;

        let fetched_at = self.shared.ledger.epoch();
        let positions = breaker
            .call(|| with_timeout(timeout, venue.get_open_positions(), || VenueError::Timeout))
            .await
            .map_err(|err| {
                AgentError::new(ErrorCode::RecoveryFailed, "failed to load open positions")
                    .with_context("cause", err)
            })?;

        let count = positions.len();
        self.shared.ledger.reconcile(positions, fetched_at);
        if let Ok(account) = self.fetch_account().await {
            self.shared.tracker.record_account(&account);
        }
        tracing::info!(open_positions = count, "Recovered open positions from venue");
        Ok(())
    }

    async fn perceive(&self) -> Result<MarketSnapshot, AgentError> {
        let breaker = self.shared.breakers.get(MARKET_DATA_KEY);
        let market_data = self.market_data.as_ref();
        let asset = &self.asset;
        let timeout = self.settings.snapshot_timeout;

        let snapshot = breaker
            .call(|| {
                with_timeout(timeout, market_data.get_snapshot(asset), || MarketDataError::Timeout)
            })
            .await?;

        if snapshot.asset != self.asset {
            return Err(AgentError::new(ErrorCode::UnknownAsset, "snapshot for another asset")
                .with_context("expected", &self.asset)
                .with_context("received", &snapshot.asset));
        }
        self.shared.tracker.record_snapshot(&snapshot);
        tracing::debug!(
            price = %snapshot.price,
            age_secs = snapshot.age(Utc::now()).as_secs(),
            "Snapshot received"
        );
        Ok(snapshot)
    }

    async fn reason(&self, snapshot: MarketSnapshot) -> Result<Decision, AgentError> {
        let position = self.shared.ledger.position(&self.asset);
        let price = snapshot.price;
        let context = AdvisoryContext::new(snapshot).with_position(position.clone());
        let mut decision = self.shared.engine.decide(&context).await?;
        if decision.action == TradeAction::Hold {
            return Ok(decision);
        }

        let account = self.refresh_equity().await;
        let size = match position {
            Some(open) if open.is_closed_by(decision.action) => Some(open.quantity),
            // Adding to an open position is reported as a signal only.
            Some(_) => None,
            None => match &account {
                Some(account) => {
                    self.settings
                        .sizer
                        .size(account, decision.sizing_confidence(), price)
                }
                None => {
                    tracing::warn!("Account unavailable, decision is signal-only");
                    None
                }
            },
        };
        decision.set_position_size(size);
        Ok(decision)
    }

    /// Refresh tracker equity for this cycle's kill switch and risk check.
    async fn refresh_equity(&self) -> Option<AccountSnapshot> {
        match self.fetch_account().await {
            Ok(account) => {
                self.shared.tracker.record_account(&account);
                Some(account)
            }
            Err(err) => {
                let equity = self
                    .shared
                    .tracker
                    .mark_to_market(&self.shared.ledger.positions());
                tracing::warn!(
                    error = %err,
                    equity = %equity,
                    "Account unavailable, equity marked from snapshot prices"
                );
                None
            }
        }
    }

    /// `None` when the approval window elapsed.
    async fn await_approval(
        &self,
        approval: &dyn ApprovalPort,
        decision: &Decision,
    ) -> Result<Option<ApprovalVerdict>, AgentError> {
        match tokio::time::timeout(self.settings.approval_timeout, approval.request_approval(decision))
            .await
        {
            Ok(verdict) => Ok(Some(verdict?)),
            Err(_) => Ok(None),
        }
    }

    /// Outer error aborts the cycle; inner error is a venue refusal.
    async fn execute(
        &self,
        decision: &Decision,
    ) -> Result<Result<ExecutionReport, String>, AgentError> {
        let venue_id = self.venue.venue_id();
        let breaker = self.shared.breakers.get(&venue_key(venue_id));
        let breaker = breaker.as_ref();
        let venue = self.venue.as_ref();
        let timeout = self.settings.venue_timeout;
        let started = Instant::now();

        let result = retry(&self.settings.retry, "venue.execute", || {
            breaker.call(|| with_timeout(timeout, venue.execute(decision), || VenueError::Timeout))
        })
        .await;

        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(report) => {
                observability::record_execution(venue_id, "filled", elapsed);
                tracing::info!(
                    decision_id = %decision.id,
                    order_id = %report.order_id,
                    quantity = %report.filled_quantity,
                    price = %report.fill_price,
                    "Decision executed"
                );
                Ok(Ok(report))
            }
            Err(CircuitBreakerError::Call(
                err @ (VenueError::Rejected(_) | VenueError::InvalidOrder(_)),
            )) => {
                observability::record_execution(venue_id, "rejected", elapsed);
                Ok(Err(err.to_string()))
            }
            Err(err) => {
                observability::record_execution(venue_id, "failed", elapsed);
                Err(err.into())
            }
        }
    }

    fn settle_close(&self, decision: &Decision, report: &ExecutionReport) {
        let Some(position) = self.shared.ledger.close(&self.asset) else {
            tracing::warn!(decision_id = %decision.id, "Closing fill without an open position");
            return;
        };
        let outcome = TradeOutcome::close(position, decision.id.clone(), report.fill_price);
        self.shared.tracker.record_realized(outcome.realized_pnl);
        tracing::info!(
            decision_id = %decision.id,
            realized_pnl = %outcome.realized_pnl,
            "Position closed"
        );
        if let Err(err) = self.shared.engine.weights().apply_outcome(&outcome) {
            tracing::warn!(error = %err, "Provider weights left unchanged");
        }
    }

    async fn fetch_account(&self) -> Result<AccountSnapshot, AgentError> {
        let breaker = self.shared.breakers.get(&venue_key(self.venue.venue_id()));
        let venue = self.venue.as_ref();
        let timeout = self.settings.venue_timeout;
        breaker
            .call(|| with_timeout(timeout, venue.get_account(), || VenueError::Timeout))
            .await
            .map_err(AgentError::from)
    }

    async fn persist(&self, decision: &Decision) -> bool {
        match self.store.record(decision.clone()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    decision_id = %decision.id,
                    error = %AgentError::from(err),
                    "Failed to persist decision"
                );
                false
            }
        }
    }
}

async fn with_timeout<T, E, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| Err(on_timeout()))
}

async fn until_cancelled<T, F>(
    token: &CancellationToken,
    state: AgentState,
    fut: F,
) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, AgentError>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(AgentError::cancelled(state)),
        result = fut => result,
    }
}
