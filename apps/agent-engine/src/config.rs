//! Configuration module for the agent engine.
//!
//! Loads YAML configuration with `${VAR}` / `${VAR:-default}` environment
//! interpolation, fills defaults and validates every section. The loaded
//! [`Config`] is read-only: orchestrators take what they need at start-up.
//!
//! # Usage
//!
//! ```rust,ignore
//! use agent_engine::config::load_config;
//!
//! let config = load_config(Some("config/agent.yaml"))?;
//! println!("quorum: {}", config.ensemble.quorum);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::services::KillSwitchThresholds;
use crate::domain::risk::{AssetClassProfile, RiskLimits};
use crate::domain::shared::AssetClass;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// Advisory provider kind not present in the registry.
    #[error("Unknown advisory provider kind '{kind}' for provider '{id}'")]
    UnknownProviderKind {
        /// Provider id.
        id: String,
        /// Requested kind.
        kind: String,
    },
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Agent loop configuration.
    pub agent: AgentSettings,
    /// Advisory ensemble configuration.
    pub ensemble: EnsembleSettings,
    /// Risk gatekeeper configuration.
    #[serde(default)]
    pub risk: RiskSettings,
    /// Kill switch thresholds.
    #[serde(default)]
    pub kill_switch: KillSwitchSettings,
    /// Circuit breaker configuration.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    /// Venue retry configuration.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Decision persistence configuration.
    #[serde(default)]
    pub persistence: PersistenceSettings,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSettings,
    /// Paper trading configuration.
    #[serde(default)]
    pub paper: PaperSettings,
}

// ============================================
// Agent
// ============================================

/// One managed asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSettings {
    /// Asset symbol.
    pub symbol: String,
    /// Asset class, drives freshness and volatility defaults.
    pub asset_class: AssetClass,
}

/// Agent loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Assets managed by this process, one orchestrator each.
    pub assets: Vec<AssetSettings>,
    /// Delay between cycles.
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    /// Maximum state transitions within one cycle.
    #[serde(default = "default_max_transitions")]
    pub max_transitions: u32,
    /// Process-wide cap on concurrently open positions.
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: usize,
    /// Require human approval before execution.
    #[serde(default)]
    pub require_approval: bool,
    /// How long to wait for an approval response.
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
    /// Deadline for a market snapshot request.
    #[serde(default = "default_snapshot_timeout_ms")]
    pub snapshot_timeout_ms: u64,
    /// Deadline for a single venue call.
    #[serde(default = "default_venue_timeout_ms")]
    pub venue_timeout_ms: u64,
}

impl AgentSettings {
    /// Delay between cycles.
    #[must_use]
    pub const fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    /// Approval wait deadline.
    #[must_use]
    pub const fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    /// Snapshot request deadline.
    #[must_use]
    pub const fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }

    /// Venue call deadline.
    #[must_use]
    pub const fn venue_timeout(&self) -> Duration {
        Duration::from_millis(self.venue_timeout_ms)
    }
}

const fn default_cycle_interval_secs() -> u64 {
    60
}
const fn default_max_transitions() -> u32 {
    12
}
const fn default_max_concurrent_positions() -> usize {
    2
}
const fn default_approval_timeout_secs() -> u64 {
    300
}
const fn default_snapshot_timeout_ms() -> u64 {
    5_000
}
const fn default_venue_timeout_ms() -> u64 {
    10_000
}

// ============================================
// Ensemble
// ============================================

/// Advisory ensemble configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleSettings {
    /// Providers, in query order.
    pub providers: Vec<ProviderSettings>,
    /// Responders required for full-confidence voting.
    #[serde(default = "default_quorum")]
    pub quorum: usize,
    /// Per-provider deadline.
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    /// Multiplicative weight step applied per closed trade.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Lower bound for a learned weight.
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
    /// Upper bound for a learned weight.
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
}

impl EnsembleSettings {
    /// Per-provider deadline.
    #[must_use]
    pub const fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Enabled providers only.
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

/// One advisory provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider id, unique within the ensemble.
    pub id: String,
    /// Implementation kind, resolved through the advisor registry.
    pub kind: String,
    /// Initial voting weight (any positive scale, renormalised on use).
    #[serde(default = "default_provider_weight")]
    pub weight: f64,
    /// Whether the provider is queried.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Kind-specific numeric parameters.
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl ProviderSettings {
    /// Numeric parameter with a fallback.
    #[must_use]
    pub fn param(&self, name: &str, default: f64) -> f64 {
        self.params.get(name).copied().unwrap_or(default)
    }
}

const fn default_quorum() -> usize {
    3
}
const fn default_provider_timeout_ms() -> u64 {
    5_000
}
const fn default_learning_rate() -> f64 {
    0.05
}
const fn default_min_weight() -> f64 {
    0.05
}
const fn default_max_weight() -> f64 {
    0.8
}
const fn default_provider_weight() -> f64 {
    1.0
}
const fn default_true() -> bool {
    true
}

// ============================================
// Risk
// ============================================

/// Per asset-class overrides.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AssetClassSettings {
    /// Maximum snapshot age before data is considered stale.
    pub staleness_secs: Option<u64>,
    /// Daily volatility used when history is insufficient.
    pub default_volatility: Option<f64>,
}

/// Risk gatekeeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSettings {
    /// VaR confidence level.
    #[serde(default = "default_var_confidence")]
    pub var_confidence: f64,
    /// Maximum VaR of the proposed trade as a fraction of equity.
    #[serde(default = "default_max_var_pct")]
    pub max_var_pct: f64,
    /// Maximum drawdown from rolling peak equity.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
    /// Correlation ceiling against open positions.
    #[serde(default = "default_max_correlation")]
    pub max_correlation: f64,
    /// Maximum single-asset exposure as a fraction of equity.
    #[serde(default = "default_max_concentration_pct")]
    pub max_concentration_pct: f64,
    /// Maximum gross exposure over equity.
    #[serde(default = "default_max_leverage")]
    pub max_leverage: f64,
    /// Returns required before VaR trusts sample volatility.
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    /// Returns and equity points retained per series.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Fraction of equity committed at 100% confidence.
    #[serde(default = "default_max_position_fraction")]
    pub max_position_fraction: f64,
    /// Decimal places for position quantities.
    #[serde(default = "default_quantity_precision")]
    pub quantity_precision: u32,
    /// Per asset-class overrides.
    #[serde(default)]
    pub asset_classes: HashMap<AssetClass, AssetClassSettings>,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            var_confidence: default_var_confidence(),
            max_var_pct: default_max_var_pct(),
            max_drawdown_pct: default_max_drawdown_pct(),
            max_correlation: default_max_correlation(),
            max_concentration_pct: default_max_concentration_pct(),
            max_leverage: default_max_leverage(),
            min_history: default_min_history(),
            history_window: default_history_window(),
            max_position_fraction: default_max_position_fraction(),
            quantity_precision: default_quantity_precision(),
            asset_classes: HashMap::new(),
        }
    }
}

impl RiskSettings {
    /// Convert to domain risk limits.
    #[must_use]
    pub fn to_limits(&self) -> RiskLimits {
        let mut profiles = HashMap::new();
        for (class, settings) in &self.asset_classes {
            let base = AssetClassProfile::defaults(*class);
            profiles.insert(
                *class,
                AssetClassProfile {
                    staleness: settings
                        .staleness_secs
                        .map_or(base.staleness, Duration::from_secs),
                    default_volatility: settings
                        .default_volatility
                        .unwrap_or(base.default_volatility),
                },
            );
        }
        RiskLimits {
            var_confidence: self.var_confidence,
            max_var_pct: self.max_var_pct,
            max_drawdown_pct: self.max_drawdown_pct,
            max_correlation: self.max_correlation,
            max_concentration_pct: self.max_concentration_pct,
            max_leverage: self.max_leverage,
            min_history: self.min_history,
            profiles,
        }
    }
}

const fn default_var_confidence() -> f64 {
    0.95
}
const fn default_max_var_pct() -> f64 {
    0.02
}
const fn default_max_drawdown_pct() -> f64 {
    0.15
}
const fn default_max_correlation() -> f64 {
    0.8
}
const fn default_max_concentration_pct() -> f64 {
    0.25
}
const fn default_max_leverage() -> f64 {
    2.0
}
const fn default_min_history() -> usize {
    30
}
const fn default_history_window() -> usize {
    90
}
const fn default_max_position_fraction() -> f64 {
    0.1
}
const fn default_quantity_precision() -> u32 {
    6
}

// ============================================
// Kill switch, breakers, retry
// ============================================

/// Kill switch thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchSettings {
    /// Drawdown from peak equity that halts trading.
    #[serde(default = "default_kill_drawdown_pct")]
    pub max_drawdown_pct: f64,
    /// Cumulative realised loss that halts trading (positive amount).
    #[serde(default = "default_kill_max_loss")]
    pub max_cumulative_loss: f64,
}

impl Default for KillSwitchSettings {
    fn default() -> Self {
        Self {
            max_drawdown_pct: default_kill_drawdown_pct(),
            max_cumulative_loss: default_kill_max_loss(),
        }
    }
}

impl KillSwitchSettings {
    /// Convert to service thresholds.
    #[must_use]
    pub fn to_thresholds(&self) -> KillSwitchThresholds {
        KillSwitchThresholds {
            max_drawdown_pct: self.max_drawdown_pct,
            max_cumulative_loss: Decimal::try_from(self.max_cumulative_loss)
                .unwrap_or(Decimal::ZERO),
        }
    }
}

const fn default_kill_drawdown_pct() -> f64 {
    0.2
}
const fn default_kill_max_loss() -> f64 {
    10_000.0
}

/// Threshold and cooldown for one breaker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds spent OPEN before a trial call.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl BreakerSettings {
    /// Convert to resilience config.
    #[must_use]
    pub const fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(self.failure_threshold, Duration::from_secs(self.cooldown_secs))
    }
}

const fn default_failure_threshold() -> u32 {
    5
}
const fn default_cooldown_secs() -> u64 {
    60
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Settings for any key without an override.
    #[serde(default)]
    pub default: BreakerSettings,
    /// Overrides by exact key (`venue:paper`) or family (`venue`).
    #[serde(default)]
    pub overrides: HashMap<String, BreakerSettings>,
}

impl CircuitBreakerSettings {
    /// Convert overrides to resilience configs.
    #[must_use]
    pub fn override_configs(&self) -> HashMap<String, CircuitBreakerConfig> {
        self.overrides
            .iter()
            .map(|(k, v)| (k.clone(), v.to_breaker_config()))
            .collect()
    }
}

/// Venue retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff cap.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Exponential growth factor.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the backoff.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetrySettings {
    /// Convert to a retry policy.
    #[must_use]
    pub const fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}

const fn default_max_retries() -> u32 {
    3
}
const fn default_initial_backoff_ms() -> u64 {
    200
}
const fn default_max_backoff_ms() -> u64 {
    5_000
}
const fn default_backoff_multiplier() -> f64 {
    2.0
}
const fn default_jitter_factor() -> f64 {
    0.2
}

// ============================================
// Persistence, logging, metrics, paper
// ============================================

/// Decision store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceKind {
    /// Process memory only.
    #[default]
    Memory,
    /// Append-only JSON lines file.
    Jsonl,
}

/// Decision persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// Backend.
    #[serde(default)]
    pub kind: PersistenceKind,
    /// Journal path for the `jsonl` backend.
    #[serde(default = "default_journal_path")]
    pub path: String,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            kind: PersistenceKind::default(),
            path: default_journal_path(),
        }
    }
}

fn default_journal_path() -> String {
    "data/decisions.jsonl".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Emit span close events (cycle timings).
    #[serde(default)]
    pub span_events: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            span_events: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Start the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,
    /// Exporter listen address.
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Paper trading configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperSettings {
    /// Venue identity, used for the breaker key.
    #[serde(default = "default_venue_id")]
    pub venue_id: String,
    /// Starting cash balance.
    #[serde(default = "default_starting_cash")]
    pub starting_cash: f64,
    /// JSON file of recorded snapshots replayed as market data.
    #[serde(default = "default_replay_path")]
    pub replay_path: String,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            venue_id: default_venue_id(),
            starting_cash: default_starting_cash(),
            replay_path: default_replay_path(),
        }
    }
}

fn default_venue_id() -> String {
    "paper".to_string()
}
const fn default_starting_cash() -> f64 {
    100_000.0
}
fn default_replay_path() -> String {
    "config/replay.json".to_string()
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// `path` defaults to `config/agent.yaml`.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config/agent.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate `${VAR}` and `${VAR:-default}` in a string.
#[allow(clippy::expect_used)] // Constant pattern
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let default_value = caps.get(2).map_or("", |m| m.as_str());
        match std::env::var(&caps[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

fn fraction_in_range(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "{name} must be in (0, 1], got {value}"
        )))
    }
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let agent = &config.agent;
    if agent.assets.is_empty() {
        return Err(ConfigError::ValidationError(
            "agent.assets must list at least one asset".to_string(),
        ));
    }
    let mut symbols: Vec<&str> = agent.assets.iter().map(|a| a.symbol.as_str()).collect();
    symbols.sort_unstable();
    if symbols.windows(2).any(|w| w[0] == w[1]) {
        return Err(ConfigError::ValidationError(
            "agent.assets contains duplicate symbols".to_string(),
        ));
    }
    if agent.max_transitions == 0 {
        return Err(ConfigError::ValidationError(
            "agent.max_transitions must be positive".to_string(),
        ));
    }
    if agent.max_concurrent_positions == 0 {
        return Err(ConfigError::ValidationError(
            "agent.max_concurrent_positions must be positive".to_string(),
        ));
    }

    let ensemble = &config.ensemble;
    if ensemble.quorum == 0 {
        return Err(ConfigError::ValidationError(
            "ensemble.quorum must be positive".to_string(),
        ));
    }
    if ensemble.enabled_providers().next().is_none() {
        return Err(ConfigError::ValidationError(
            "ensemble.providers must enable at least one provider".to_string(),
        ));
    }
    let mut ids: Vec<&str> = ensemble.providers.iter().map(|p| p.id.as_str()).collect();
    ids.sort_unstable();
    if ids.windows(2).any(|w| w[0] == w[1]) {
        return Err(ConfigError::ValidationError(
            "ensemble.providers contains duplicate ids".to_string(),
        ));
    }
    for provider in &ensemble.providers {
        if !provider.weight.is_finite() || provider.weight <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "ensemble provider '{}' weight must be positive and finite",
                provider.id
            )));
        }
    }
    if !(0.0..1.0).contains(&ensemble.learning_rate) {
        return Err(ConfigError::ValidationError(
            "ensemble.learning_rate must be in [0, 1)".to_string(),
        ));
    }
    if ensemble.min_weight <= 0.0 || ensemble.min_weight > ensemble.max_weight {
        return Err(ConfigError::ValidationError(
            "ensemble.min_weight must be positive and not exceed max_weight".to_string(),
        ));
    }

    let risk = &config.risk;
    if !(risk.var_confidence > 0.5 && risk.var_confidence < 1.0) {
        return Err(ConfigError::ValidationError(
            "risk.var_confidence must be in (0.5, 1)".to_string(),
        ));
    }
    fraction_in_range("risk.max_var_pct", risk.max_var_pct)?;
    fraction_in_range("risk.max_drawdown_pct", risk.max_drawdown_pct)?;
    fraction_in_range("risk.max_correlation", risk.max_correlation)?;
    fraction_in_range("risk.max_concentration_pct", risk.max_concentration_pct)?;
    fraction_in_range("risk.max_position_fraction", risk.max_position_fraction)?;
    if !risk.max_leverage.is_finite() || risk.max_leverage <= 0.0 {
        return Err(ConfigError::ValidationError(
            "risk.max_leverage must be positive".to_string(),
        ));
    }
    if risk.history_window < 2 {
        return Err(ConfigError::ValidationError(
            "risk.history_window must be at least 2".to_string(),
        ));
    }
    for (class, settings) in &risk.asset_classes {
        if let Some(vol) = settings.default_volatility
            && (!vol.is_finite() || vol <= 0.0)
        {
            return Err(ConfigError::ValidationError(format!(
                "risk.asset_classes.{class}.default_volatility must be positive"
            )));
        }
    }

    fraction_in_range("kill_switch.max_drawdown_pct", config.kill_switch.max_drawdown_pct)?;
    if config.kill_switch.max_cumulative_loss <= 0.0 {
        return Err(ConfigError::ValidationError(
            "kill_switch.max_cumulative_loss must be positive".to_string(),
        ));
    }

    let breakers = std::iter::once(("default", &config.circuit_breaker.default)).chain(
        config
            .circuit_breaker
            .overrides
            .iter()
            .map(|(k, v)| (k.as_str(), v)),
    );
    for (key, settings) in breakers {
        if settings.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(format!(
                "circuit_breaker '{key}' failure_threshold must be positive"
            )));
        }
    }

    if config.retry.backoff_multiplier < 1.0 || !(0.0..=1.0).contains(&config.retry.jitter_factor) {
        return Err(ConfigError::ValidationError(
            "retry.backoff_multiplier must be >= 1 and jitter_factor in [0, 1]".to_string(),
        ));
    }

    if config.paper.starting_cash <= 0.0 {
        return Err(ConfigError::ValidationError(
            "paper.starting_cash must be positive".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
agent:
  assets:
    - symbol: BTC-USD
      asset_class: CRYPTO
ensemble:
  providers:
    - id: momentum
      kind: momentum
    - id: reversion
      kind: mean_reversion
    - id: trend
      kind: trend
";

    #[test]
    fn test_load_minimal_config_fills_defaults() {
        let config = load_config_from_string(MINIMAL).unwrap();
        assert_eq!(config.agent.max_concurrent_positions, 2);
        assert_eq!(config.agent.max_transitions, 12);
        assert_eq!(config.ensemble.quorum, 3);
        assert_eq!(config.circuit_breaker.default.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.default.cooldown_secs, 60);
        assert_eq!(config.persistence.kind, PersistenceKind::Memory);
        assert!((config.risk.var_confidence - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.ensemble.enabled_providers().count(), 3);
    }

    #[test]
    fn test_zero_quorum_rejected() {
        let yaml = format!("{MINIMAL}  quorum: 0\n");
        let err = load_config_from_string(&yaml).unwrap_err();
        assert!(err.to_string().contains("quorum"));
    }

    #[test]
    fn test_non_positive_weight_rejected() {
        let yaml = MINIMAL.replace("kind: trend", "kind: trend\n      weight: -1.0");
        assert!(matches!(
            load_config_from_string(&yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_all_providers_disabled_rejected() {
        let yaml = r"
agent:
  assets:
    - symbol: SPY
      asset_class: EQUITY
ensemble:
  providers:
    - id: momentum
      kind: momentum
      enabled: false
";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn test_interpolate_env_default_used_when_unset() {
        let out = interpolate_env_vars("path: ${AGENT_ENGINE_TEST_UNSET_VAR:-data/x.jsonl}");
        assert_eq!(out, "path: data/x.jsonl");
    }

    #[test]
    fn test_asset_class_overrides_reach_limits() {
        let yaml = format!(
            "{MINIMAL}risk:\n  asset_classes:\n    CRYPTO:\n      staleness_secs: 30\n"
        );
        let config = load_config_from_string(&yaml).unwrap();
        let limits = config.risk.to_limits();
        let profile = limits.profile(AssetClass::Crypto);
        assert_eq!(profile.staleness, Duration::from_secs(30));
        assert!((profile.default_volatility - 0.04).abs() < f64::EPSILON);
    }

    #[test]
    fn test_breaker_override_conversion() {
        let yaml = format!(
            "{MINIMAL}circuit_breaker:\n  overrides:\n    market_data:\n      failure_threshold: 2\n      cooldown_secs: 10\n"
        );
        let config = load_config_from_string(&yaml).unwrap();
        let overrides = config.circuit_breaker.override_configs();
        assert_eq!(overrides["market_data"].failure_threshold, 2);
        assert_eq!(overrides["market_data"].cooldown, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_var_confidence_rejected() {
        let yaml = format!("{MINIMAL}risk:\n  var_confidence: 0.3\n");
        assert!(load_config_from_string(&yaml).is_err());
    }
}
