//! Process-wide registry of circuit breakers keyed by dependency.
//!
//! Keys name the dependency, never the asset: every orchestrator that talks
//! to `venue:paper` shares the same breaker.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics};

/// Breaker key for the market snapshot provider.
pub const MARKET_DATA_KEY: &str = "market_data";

/// Breaker key for a trading venue.
#[must_use]
pub fn venue_key(venue_id: &str) -> String {
    format!("venue:{venue_id}")
}

/// Breaker key for an advisory provider.
#[must_use]
pub fn advisor_key(provider_id: &str) -> String {
    format!("advisor:{provider_id}")
}

/// Lazily-populated set of breakers.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    default_config: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create a registry with a default configuration and per-key overrides.
    ///
    /// Override keys may be exact (`venue:paper`) or a key family (`venue`).
    #[must_use]
    pub fn new(
        default_config: CircuitBreakerConfig,
        overrides: HashMap<String, CircuitBreakerConfig>,
    ) -> Self {
        Self {
            default_config,
            overrides,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Configuration that applies to `key`.
    #[must_use]
    pub fn config_for(&self, key: &str) -> CircuitBreakerConfig {
        if let Some(config) = self.overrides.get(key) {
            return *config;
        }
        key.split_once(':')
            .and_then(|(family, _)| self.overrides.get(family))
            .copied()
            .unwrap_or(self.default_config)
    }

    /// Get the breaker for `key`, creating it on first use.
    pub fn get(&self, key: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(breaker) = breakers.get(key) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        let config = self.config_for(key);
        Arc::clone(
            breakers
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(key, config))),
        )
    }

    /// Counters for every breaker created so far, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CircuitBreakerMetrics> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        let mut metrics: Vec<_> = breakers.values().map(|b| b.metrics()).collect();
        metrics.sort_by(|a, b| a.name.cmp(&b.name));
        metrics
    }

    /// Reset every breaker to CLOSED.
    pub fn reset_all(&self) {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        for breaker in breakers.values() {
            breaker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitBreakerState;
    use std::time::Duration;

    #[test]
    fn test_same_key_returns_shared_breaker() {
        let registry = BreakerRegistry::default();
        let a = registry.get(&venue_key("paper"));
        let b = registry.get(&venue_key("paper"));
        assert!(Arc::ptr_eq(&a, &b));

        a.force_open();
        assert_eq!(b.state(), CircuitBreakerState::Open);
    }

    #[test]
    fn test_family_override_applies_to_all_members() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "advisor".to_string(),
            CircuitBreakerConfig::new(2, Duration::from_secs(5)),
        );
        overrides.insert(
            "advisor:slow".to_string(),
            CircuitBreakerConfig::new(7, Duration::from_secs(9)),
        );
        let registry = BreakerRegistry::new(CircuitBreakerConfig::default(), overrides);

        assert_eq!(registry.config_for(&advisor_key("fast")).failure_threshold, 2);
        assert_eq!(registry.config_for(&advisor_key("slow")).failure_threshold, 7);
        assert_eq!(registry.config_for(MARKET_DATA_KEY).failure_threshold, 5);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let registry = BreakerRegistry::default();
        registry.get("venue:b");
        registry.get("venue:a");
        let names: Vec<_> = registry.snapshot().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["venue:a", "venue:b"]);
    }
}
