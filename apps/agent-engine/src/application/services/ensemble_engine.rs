//! Ensemble engine: concurrent provider fan-out and aggregation.
//!
//! Every enabled provider is queried concurrently, each through its own
//! circuit breaker (`advisor:<id>`) and bounded by the provider timeout.
//! Failures never abort the round; they only lower the number of active
//! responders and therefore the tier and confidence of the result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use super::weight_book::ProviderWeightBook;
use crate::application::ports::{AdvisoryContext, AdvisoryError, AdvisoryProvider};
use crate::domain::decision::{Decision, EnsembleMetadata, ProviderVote, VoteRecord};
use crate::domain::ensemble::{EnsembleError, aggregate, renormalize};
use crate::domain::shared::ProviderId;
use crate::observability;
use crate::resilience::{BreakerRegistry, CircuitBreakerError, advisor_key};

/// Outcome of querying one provider.
#[derive(Debug)]
struct ProviderResponse {
    id: ProviderId,
    result: Result<ProviderVote, CircuitBreakerError<AdvisoryError>>,
    latency: Duration,
}

/// Produces one [`Decision`] per snapshot from the configured providers.
pub struct EnsembleEngine {
    providers: Vec<Arc<dyn AdvisoryProvider>>,
    breakers: Arc<BreakerRegistry>,
    weights: Arc<ProviderWeightBook>,
    quorum: usize,
    provider_timeout: Duration,
}

impl std::fmt::Debug for EnsembleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleEngine")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.id().as_str()).collect::<Vec<_>>(),
            )
            .field("quorum", &self.quorum)
            .field("provider_timeout", &self.provider_timeout)
            .finish_non_exhaustive()
    }
}

impl EnsembleEngine {
    /// Create an engine over the enabled `providers`.
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn AdvisoryProvider>>,
        breakers: Arc<BreakerRegistry>,
        weights: Arc<ProviderWeightBook>,
        quorum: usize,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            providers,
            breakers,
            weights,
            quorum,
            provider_timeout,
        }
    }

    /// Number of enabled providers.
    #[must_use]
    pub fn total_providers(&self) -> usize {
        self.providers.len()
    }

    /// Configured quorum.
    #[must_use]
    pub const fn quorum(&self) -> usize {
        self.quorum
    }

    /// Shared weight book.
    #[must_use]
    pub const fn weights(&self) -> &Arc<ProviderWeightBook> {
        &self.weights
    }

    /// Query every provider and aggregate their votes into a PROPOSED decision.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError`] only for misconfiguration (quorum of zero,
    /// no providers, missing or invalid weights). Provider failures degrade
    /// the decision instead.
    pub async fn decide(&self, context: &AdvisoryContext) -> Result<Decision, EnsembleError> {
        let responses = join_all(self.providers.iter().map(|p| self.query_one(p, context))).await;

        let mut votes = Vec::with_capacity(responses.len());
        let mut failed = Vec::new();
        for response in responses {
            observability::record_provider_latency(
                response.id.as_str(),
                response.latency.as_secs_f64(),
            );
            match response.result {
                Ok(vote) => votes.push(vote),
                Err(err) => {
                    let reason = match &err {
                        CircuitBreakerError::Open { .. } => "breaker_open",
                        CircuitBreakerError::Call(inner) => inner.reason(),
                    };
                    observability::record_provider_failure(response.id.as_str(), reason);
                    tracing::warn!(
                        provider = %response.id,
                        asset = %context.snapshot.asset,
                        error = %err,
                        "Advisory provider produced no vote"
                    );
                    failed.push(response.id);
                }
            }
        }

        let active: Vec<ProviderId> = votes.iter().map(|v| v.provider_id.clone()).collect();
        let weights = renormalize(&self.weights.snapshot(), &active)?;
        let result = aggregate(&votes, &weights, self.providers.len(), self.quorum)?;

        let records: Vec<VoteRecord> = votes
            .iter()
            .map(|v| VoteRecord {
                provider_id: v.provider_id.clone(),
                action: v.action,
                confidence: v.confidence,
                weight: weights.get(&v.provider_id).copied().unwrap_or(0.0),
            })
            .collect();

        let metadata = EnsembleMetadata {
            tier: result.tier,
            active_providers: votes.len(),
            total_providers: self.providers.len(),
            quorum: self.quorum,
            weights,
            agreement_score: result.agreement_score,
            quorum_failed: result.quorum_failed,
            failed_providers: failed,
            votes: records,
        };

        observability::record_decision(
            result.tier.as_str(),
            result.action.as_str(),
            result.confidence,
        );
        tracing::info!(
            asset = %context.snapshot.asset,
            action = %result.action,
            confidence = result.confidence,
            tier = %result.tier,
            active = metadata.active_providers,
            total = metadata.total_providers,
            quorum_failed = result.quorum_failed,
            "Ensemble decision"
        );

        Ok(Decision::propose(
            &context.snapshot,
            result.action,
            result.confidence,
            summarize(&votes),
            metadata,
        ))
    }

    async fn query_one(
        &self,
        provider: &Arc<dyn AdvisoryProvider>,
        context: &AdvisoryContext,
    ) -> ProviderResponse {
        let id = provider.id().clone();
        let breaker = self.breakers.get(&advisor_key(id.as_str()));
        let timeout = self.provider_timeout;
        let start = Instant::now();

        let result = breaker
            .call(|| async {
                match tokio::time::timeout(timeout, provider.query(context)).await {
                    Ok(result) => result,
                    Err(_) => Err(AdvisoryError::Timeout),
                }
            })
            .await;
        let latency = start.elapsed();

        let result = result.map(|mut vote| {
            // Attribution is keyed by the configured id, not whatever the
            // provider reports.
            vote.provider_id = id.clone();
            vote.with_latency(latency)
        });

        ProviderResponse {
            id,
            result,
            latency,
        }
    }
}

fn summarize(votes: &[ProviderVote]) -> String {
    if votes.is_empty() {
        return "no advisory provider responded".to_string();
    }
    votes
        .iter()
        .map(|v| {
            format!(
                "[{}] {} ({:.1}): {}",
                v.provider_id, v.action, v.confidence, v.reasoning
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::{FallbackTier, TradeAction};
    use crate::domain::ensemble::WeightAdjuster;
    use crate::domain::shared::AssetClass;
    use crate::domain::shared::fixtures::snapshot_with_closes;
    use crate::resilience::CircuitBreakerConfig;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::{BTreeMap, HashMap};

    enum Behaviour {
        Vote(TradeAction, f64),
        Fail,
        Hang,
    }

    struct FakeProvider {
        id: ProviderId,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl AdvisoryProvider for FakeProvider {
        fn id(&self) -> &ProviderId {
            &self.id
        }

        async fn query(&self, _context: &AdvisoryContext) -> Result<ProviderVote, AdvisoryError> {
            match self.behaviour {
                Behaviour::Vote(action, confidence) => Ok(ProviderVote::new(
                    ProviderId::new("self-reported"),
                    action,
                    confidence,
                    "fake",
                )),
                Behaviour::Fail => Err(AdvisoryError::Unavailable("down".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(AdvisoryError::Timeout)
                }
            }
        }
    }

    fn engine(specs: Vec<(&str, f64, Behaviour)>, quorum: usize) -> EnsembleEngine {
        let weights: BTreeMap<ProviderId, f64> = specs
            .iter()
            .map(|(id, w, _)| (ProviderId::new(*id), *w))
            .collect();
        let providers: Vec<Arc<dyn AdvisoryProvider>> = specs
            .into_iter()
            .map(|(id, _, behaviour)| {
                Arc::new(FakeProvider {
                    id: ProviderId::new(id),
                    behaviour,
                }) as Arc<dyn AdvisoryProvider>
            })
            .collect();
        EnsembleEngine::new(
            providers,
            Arc::new(BreakerRegistry::new(
                CircuitBreakerConfig::advisor(),
                HashMap::new(),
            )),
            Arc::new(ProviderWeightBook::new(weights, WeightAdjuster::default()).unwrap()),
            quorum,
            Duration::from_millis(50),
        )
    }

    fn context() -> AdvisoryContext {
        AdvisoryContext::new(snapshot_with_closes(
            "BTC-USD",
            AssetClass::Crypto,
            dec!(100),
            Utc::now(),
            &[],
        ))
    }

    #[tokio::test]
    async fn test_full_quorum_weighted_vote() {
        let engine = engine(
            vec![
                ("a", 1.0, Behaviour::Vote(TradeAction::Buy, 80.0)),
                ("b", 1.0, Behaviour::Vote(TradeAction::Buy, 70.0)),
                ("c", 1.0, Behaviour::Vote(TradeAction::Sell, 60.0)),
            ],
            3,
        );
        let decision = engine.decide(&context()).await.unwrap();
        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.ensemble_metadata.tier, FallbackTier::WeightedVoting);
        assert!((decision.confidence - 71.42857).abs() < 1e-3);
        assert!(decision.is_signal_only());
        assert_eq!(
            decision.ensemble_metadata.votes[0].provider_id,
            ProviderId::new("a")
        );
    }

    #[tokio::test]
    async fn test_failures_and_timeouts_degrade_to_simple_average() {
        let engine = engine(
            vec![
                ("a", 1.0, Behaviour::Vote(TradeAction::Sell, 80.0)),
                ("b", 1.0, Behaviour::Fail),
                ("c", 1.0, Behaviour::Hang),
            ],
            3,
        );
        let decision = engine.decide(&context()).await.unwrap();
        let meta = &decision.ensemble_metadata;
        assert_eq!(meta.tier, FallbackTier::SimpleAverage);
        assert!(meta.quorum_failed);
        assert_eq!(meta.failed_providers.len(), 2);
        assert!(decision.confidence < 80.0);
    }

    #[tokio::test]
    async fn test_nobody_responds_is_hold() {
        let engine = engine(
            vec![("a", 1.0, Behaviour::Fail), ("b", 1.0, Behaviour::Fail)],
            2,
        );
        let decision = engine.decide(&context()).await.unwrap();
        assert_eq!(decision.action, TradeAction::Hold);
        assert_eq!(decision.confidence, 0.0);
        assert_eq!(decision.ensemble_metadata.tier, FallbackTier::QuorumFailed);
    }

    #[tokio::test]
    async fn test_zero_quorum_is_misconfiguration() {
        let engine = engine(vec![("a", 1.0, Behaviour::Vote(TradeAction::Buy, 50.0))], 0);
        assert!(matches!(
            engine.decide(&context()).await,
            Err(EnsembleError::Misconfigured(_))
        ));
    }
}
