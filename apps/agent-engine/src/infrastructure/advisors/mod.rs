//! Advisory Provider Adapters
//!
//! Heuristic providers plus the registry that maps a configured `kind` to a
//! constructor. New provider kinds register a factory; configuration stays
//! declarative.

mod heuristics;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::application::ports::AdvisoryProvider;
use crate::config::{ConfigError, EnsembleSettings, ProviderSettings};

pub use heuristics::{MeanReversionAdvisor, MomentumAdvisor, TrendAdvisor};

/// Builds one provider from its settings.
pub type AdvisorFactory = fn(&ProviderSettings) -> Arc<dyn AdvisoryProvider>;

/// Provider kinds known to the binary.
#[derive(Debug, Clone)]
pub struct AdvisorRegistry {
    factories: BTreeMap<String, AdvisorFactory>,
}

impl Default for AdvisorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl AdvisorRegistry {
    /// Registry without any kinds.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with `momentum`, `mean_reversion` and `trend`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("momentum", |s| Arc::new(MomentumAdvisor::from_settings(s)));
        registry.register("mean_reversion", |s| {
            Arc::new(MeanReversionAdvisor::from_settings(s))
        });
        registry.register("trend", |s| Arc::new(TrendAdvisor::from_settings(s)));
        registry
    }

    /// Add or replace a kind.
    pub fn register(&mut self, kind: impl Into<String>, factory: AdvisorFactory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build one provider.
    pub fn build(
        &self,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn AdvisoryProvider>, ConfigError> {
        let factory = self
            .factories
            .get(&settings.kind)
            .ok_or_else(|| ConfigError::UnknownProviderKind {
                id: settings.id.clone(),
                kind: settings.kind.clone(),
            })?;
        Ok(factory(settings))
    }

    /// Build every enabled provider in configuration order.
    pub fn build_all(
        &self,
        ensemble: &EnsembleSettings,
    ) -> Result<Vec<Arc<dyn AdvisoryProvider>>, ConfigError> {
        ensemble
            .enabled_providers()
            .map(|settings| self.build(settings))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::ProviderId;
    use std::collections::BTreeMap as Map;

    fn provider(id: &str, kind: &str, enabled: bool) -> ProviderSettings {
        ProviderSettings {
            id: id.to_string(),
            kind: kind.to_string(),
            weight: 1.0,
            enabled,
            params: Map::new(),
        }
    }

    fn ensemble(providers: Vec<ProviderSettings>) -> EnsembleSettings {
        EnsembleSettings {
            providers,
            quorum: 2,
            provider_timeout_ms: 100,
            learning_rate: 0.05,
            min_weight: 0.05,
            max_weight: 0.8,
        }
    }

    #[test]
    fn test_builds_enabled_providers_in_order() {
        let registry = AdvisorRegistry::with_defaults();
        let providers = registry
            .build_all(&ensemble(vec![
                provider("trend-1", "trend", true),
                provider("off", "momentum", false),
                provider("mr-1", "mean_reversion", true),
            ]))
            .unwrap();
        let ids: Vec<_> = providers.iter().map(|p| p.id().clone()).collect();
        assert_eq!(ids, vec![ProviderId::new("trend-1"), ProviderId::new("mr-1")]);
    }

    #[test]
    fn test_unknown_kind_names_provider() {
        let registry = AdvisorRegistry::with_defaults();
        let err = registry
            .build_all(&ensemble(vec![provider("llm-1", "llm", true)]))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ConfigError::UnknownProviderKind { ref id, ref kind } if id == "llm-1" && kind == "llm"
        ));
    }

    #[test]
    fn test_default_kinds() {
        assert_eq!(
            AdvisorRegistry::default().kinds(),
            vec!["mean_reversion", "momentum", "trend"]
        );
    }
}
