//! Agent Engine Binary
//!
//! Runs one agent per configured asset against the paper venue and replayed
//! market data.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin agent-engine -- config/agent.yaml
//! ```
//!
//! # Environment Variables
//!
//! - `AGENT_CONFIG`: config path when no argument is given (default: config/agent.yaml)
//! - `RUST_LOG`: overrides the configured log level
//!
//! When `agent.require_approval` is set, pending decisions are printed and
//! answered on stdin with `y` or `n`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use agent_engine::application::orchestrator::{
    AgentOrchestrator, OrchestratorSettings, SharedResources,
};
use agent_engine::application::ports::{ApprovalPort, DecisionStore};
use agent_engine::application::services::{
    EnsembleEngine, KillSwitch, PortfolioTracker, PositionLedger, ProviderWeightBook,
};
use agent_engine::config::{Config, PersistenceKind, load_config};
use agent_engine::domain::ensemble::WeightAdjuster;
use agent_engine::domain::risk::RiskGatekeeper;
use agent_engine::domain::shared::{AssetId, ProviderId};
use agent_engine::infrastructure::advisors::AdvisorRegistry;
use agent_engine::infrastructure::approval::{ChannelApprovalGateway, PendingDecision};
use agent_engine::infrastructure::market_data::ReplaySnapshotProvider;
use agent_engine::infrastructure::persistence::{InMemoryDecisionStore, JsonlDecisionStore};
use agent_engine::infrastructure::venue::PaperVenue;
use agent_engine::observability::init_metrics;
use agent_engine::resilience::BreakerRegistry;
use agent_engine::telemetry::init_tracing;

/// Time allowed for agents to finish their current cycle after a stop signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

type Agent = AgentOrchestrator<ReplaySnapshotProvider, PaperVenue, dyn DecisionStore>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("AGENT_CONFIG").ok());
    let config = load_config(path.as_deref()).context("loading configuration")?;

    init_tracing(&config.logging)?;
    if config.metrics.enabled {
        init_metrics(&config.metrics)?;
    }

    tracing::info!(
        assets = config.agent.assets.len(),
        providers = config.ensemble.enabled_providers().count(),
        quorum = config.ensemble.quorum,
        "Starting agent engine"
    );

    let shared = build_shared(&config)?;
    let market_data = Arc::new(
        ReplaySnapshotProvider::from_path(&config.paper.replay_path)
            .context("loading replay snapshots")?,
    );
    let venue = Arc::new(PaperVenue::new(
        config.paper.venue_id.clone(),
        starting_cash(&config)?,
    ));
    let store = build_store(&config).await?;
    let settings = OrchestratorSettings::from_config(&config);
    let cancel = CancellationToken::new();

    let approval: Option<Arc<dyn ApprovalPort>> = if config.agent.require_approval {
        let (gateway, requests) = ChannelApprovalGateway::new(config.agent.assets.len());
        tokio::spawn(review_on_stdin(requests, cancel.clone()));
        Some(Arc::new(gateway))
    } else {
        None
    };

    let mut agents = JoinSet::new();
    for asset in &config.agent.assets {
        let mut agent: Agent = AgentOrchestrator::new(
            AssetId::new(&asset.symbol),
            shared.clone(),
            Arc::clone(&market_data),
            Arc::clone(&venue),
            Arc::clone(&store),
            settings,
        )
        .with_cancellation(cancel.child_token());
        if let Some(approval) = &approval {
            agent = agent.with_approval(Arc::clone(approval));
        }
        tracing::info!(asset = %asset.symbol, asset_class = %asset.asset_class, "Agent configured");
        agents.spawn(agent.run(config.agent.cycle_interval()));
    }

    tracing::info!("Agent engine ready");
    shutdown_signal().await;
    tracing::info!("Stop signal received, finishing current cycles");
    cancel.cancel();

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while let Some(result) = agents.join_next().await {
            if let Err(err) = result {
                tracing::error!(error = %err, "Agent task failed");
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Shutdown timeout reached, aborting remaining agents");
        agents.abort_all();
    }

    tracing::info!("Agent engine stopped");
    Ok(())
}

fn starting_cash(config: &Config) -> anyhow::Result<Decimal> {
    Decimal::try_from(config.paper.starting_cash).context("paper.starting_cash is not a valid amount")
}

fn build_shared(config: &Config) -> anyhow::Result<SharedResources> {
    let breakers = Arc::new(BreakerRegistry::new(
        config.circuit_breaker.default.to_breaker_config(),
        config.circuit_breaker.override_configs(),
    ));

    let providers = AdvisorRegistry::with_defaults().build_all(&config.ensemble)?;
    let initial: BTreeMap<ProviderId, f64> = config
        .ensemble
        .enabled_providers()
        .map(|p| (ProviderId::new(&p.id), p.weight))
        .collect();
    let adjuster = WeightAdjuster {
        learning_rate: config.ensemble.learning_rate,
        min_weight: config.ensemble.min_weight,
        max_weight: config.ensemble.max_weight,
    };
    let weights = Arc::new(ProviderWeightBook::new(initial, adjuster)?);

    let engine = Arc::new(EnsembleEngine::new(
        providers,
        Arc::clone(&breakers),
        weights,
        config.ensemble.quorum,
        config.ensemble.provider_timeout(),
    ));

    Ok(SharedResources {
        engine,
        gatekeeper: Arc::new(RiskGatekeeper::new(config.risk.to_limits())),
        ledger: Arc::new(PositionLedger::new(config.agent.max_concurrent_positions)),
        breakers,
        kill_switch: Arc::new(KillSwitch::new(config.kill_switch.to_thresholds())),
        tracker: Arc::new(PortfolioTracker::new(
            starting_cash(config)?,
            config.risk.history_window,
        )),
    })
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn DecisionStore>> {
    Ok(match config.persistence.kind {
        PersistenceKind::Memory => Arc::new(InMemoryDecisionStore::new()),
        PersistenceKind::Jsonl => Arc::new(
            JsonlDecisionStore::open(&config.persistence.path)
                .await
                .context("opening decision journal")?,
        ),
    })
}

/// Answer approval requests from stdin.
async fn review_on_stdin(mut requests: mpsc::Receiver<PendingDecision>, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let pending = tokio::select! {
            () = cancel.cancelled() => break,
            pending = requests.recv() => match pending {
                Some(pending) => pending,
                None => break,
            },
        };
        let d = &pending.decision;
        println!(
            "Approve {} {} size={:?} confidence={:.1} (decision {})? [y/N]",
            d.action, d.asset, d.recommended_position_size, d.confidence, d.id
        );
        let answer = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line.ok().flatten().unwrap_or_default(),
        };
        let delivered = if matches!(answer.trim(), "y" | "Y" | "yes") {
            pending.approve()
        } else {
            pending.deny("denied by operator")
        };
        if !delivered {
            tracing::warn!("Approval answered after the request expired");
        }
    }
}

/// Wait for SIGINT or SIGTERM.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
