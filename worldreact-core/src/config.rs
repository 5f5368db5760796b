//! Configuration for the world-reaction engine.
//!
//! Maps directly to `worldreact.toml`. Every field has a serde default, so
//! an empty document (or [`WorldReactConfig::default`]) yields a working
//! engine. The config is built once at startup and handed to each component;
//! nothing reads it from global state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReactError, Result};

/// Largest duration any `*_secs` field (or derived cache TTL) may hold: one year.
pub const MAX_CONFIG_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// Largest accepted cache TTL multiplier.
pub const MAX_TTL_MULTIPLIER: f64 = 100.0;

/// Top-level worldreact configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorldReactConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Bounded concurrency and timeouts.
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    /// Reaction cache sizing and TTL policy.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Batch grouping.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Fallback synthesis.
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Host integration behaviour.
    #[serde(default)]
    pub integration: IntegrationConfig,
    /// LLM backend used by the default reaction processor.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl WorldReactConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ReactError::Config` if the TOML is invalid or fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| ReactError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    /// Returns `ReactError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, secs: f64) -> Result<()> {
            if !(secs.is_finite() && secs > 0.0) {
                Err(ReactError::Config(format!("{name} must be a positive number of seconds, got {secs}")))
            } else if secs > MAX_CONFIG_SECS {
                Err(ReactError::Config(format!("{name} must be at most {MAX_CONFIG_SECS} seconds, got {secs}")))
            } else {
                Ok(())
            }
        }
        fn multiplier(name: &str, factor: f64) -> Result<()> {
            if factor.is_finite() && factor > 0.0 && factor <= MAX_TTL_MULTIPLIER {
                Ok(())
            } else {
                Err(ReactError::Config(format!(
                    "{name} must be in (0, {MAX_TTL_MULTIPLIER}], got {factor}"
                )))
            }
        }
        fn nonzero(name: &str, value: usize) -> Result<()> {
            if value == 0 {
                Err(ReactError::Config(format!("{name} must be greater than zero")))
            } else {
                Ok(())
            }
        }

        nonzero("concurrency.max_concurrent_reactions", self.concurrency.max_concurrent_reactions)?;
        positive("concurrency.reaction_timeout_secs", self.concurrency.reaction_timeout_secs)?;
        positive("concurrency.priority_timeout_secs", self.concurrency.priority_timeout_secs)?;
        positive("concurrency.max_timeout_secs", self.concurrency.max_timeout_secs)?;
        if self.concurrency.reaction_timeout_secs > self.concurrency.max_timeout_secs {
            return Err(ReactError::Config(
                "concurrency.reaction_timeout_secs exceeds concurrency.max_timeout_secs".into(),
            ));
        }

        nonzero("cache.max_size", self.cache.max_size)?;
        positive("cache.default_ttl_secs", self.cache.default_ttl_secs)?;
        positive("cache.fallback_ttl_secs", self.cache.fallback_ttl_secs)?;
        multiplier("cache.success_ttl_multiplier", self.cache.success_ttl_multiplier)?;
        positive("cache.slow_call_threshold_secs", self.cache.slow_call_threshold_secs)?;
        multiplier("cache.slow_call_ttl_multiplier", self.cache.slow_call_ttl_multiplier)?;
        let longest_ttl = self.cache.default_ttl_secs
            * self.cache.success_ttl_multiplier.max(1.0)
            * self.cache.slow_call_ttl_multiplier.max(1.0);
        if longest_ttl > MAX_CONFIG_SECS {
            return Err(ReactError::Config(format!(
                "cache.default_ttl_secs times the TTL multipliers must be at most {MAX_CONFIG_SECS} seconds, got {longest_ttl}"
            )));
        }
        positive("cache.sweep_interval_secs", self.cache.sweep_interval_secs)?;

        nonzero("batch.batch_size", self.batch.batch_size)?;
        positive("batch.batch_timeout_secs", self.batch.batch_timeout_secs)?;
        nonzero("batch.max_concurrent_batches", self.batch.max_concurrent_batches)?;

        nonzero("integration.priority_max_entities", self.integration.priority_max_entities)?;
        positive(
            "integration.sequential_cost_per_entity_secs",
            self.integration.sequential_cost_per_entity_secs,
        )?;
        positive("integration.metrics_log_interval_secs", self.integration.metrics_log_interval_secs)?;

        if !matches!(self.llm.provider.as_str(), "ollama" | "openai" | "none") {
            return Err(ReactError::Config(format!(
                "llm.provider must be one of ollama, openai, none; got {:?}",
                self.llm.provider
            )));
        }
        if self.llm.request_timeout_ms == 0 {
            return Err(ReactError::Config("llm.request_timeout_ms must be greater than zero".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Bounded concurrency and per-item timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum reaction computations in flight at once.
    #[serde(default = "default_5_usize")]
    pub max_concurrent_reactions: usize,
    /// Per-item timeout for a reaction computation.
    #[serde(default = "default_3_0")]
    pub reaction_timeout_secs: f64,
    /// Tighter per-item timeout used by priority mode.
    #[serde(default = "default_1_5")]
    pub priority_timeout_secs: f64,
    /// Upper bound accepted by runtime timeout adjustments.
    #[serde(default = "default_60_0")]
    pub max_timeout_secs: f64,
}

impl ConcurrencyConfig {
    /// Per-item timeout as a `Duration`.
    #[must_use]
    pub fn reaction_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.reaction_timeout_secs)
    }

    /// Priority-mode timeout as a `Duration`.
    #[must_use]
    pub fn priority_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.priority_timeout_secs)
    }

    /// Largest timeout a runtime adjustment may set.
    #[must_use]
    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.max_timeout_secs)
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reactions: 5,
            reaction_timeout_secs: 3.0,
            priority_timeout_secs: 1.5,
            max_timeout_secs: 60.0,
        }
    }
}

/// Reaction cache sizing and TTL policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached reactions.
    #[serde(default = "default_1000")]
    pub max_size: usize,
    /// Base TTL applied to fresh results.
    #[serde(default = "default_300_0")]
    pub default_ttl_secs: f64,
    /// Short TTL for fallback results, so a failing dependency is re-checked soon.
    #[serde(default = "default_60_0")]
    pub fallback_ttl_secs: f64,
    /// Multiplier on the base TTL for successful results.
    #[serde(default = "default_2_0")]
    pub success_ttl_multiplier: f64,
    /// Assessments slower than this are considered expensive.
    #[serde(default = "default_2_0")]
    pub slow_call_threshold_secs: f64,
    /// Extra multiplier for expensive successful results.
    #[serde(default = "default_1_5")]
    pub slow_call_ttl_multiplier: f64,
    /// How often the background sweep removes expired entries.
    #[serde(default = "default_300_0")]
    pub sweep_interval_secs: f64,
}

impl CacheConfig {
    /// Base TTL as a `Duration`.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.default_ttl_secs)
    }

    /// Fallback TTL as a `Duration`.
    #[must_use]
    pub fn fallback_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.fallback_ttl_secs)
    }

    /// Slow-call threshold as a `Duration`.
    #[must_use]
    pub fn slow_call_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.slow_call_threshold_secs)
    }

    /// Sweep interval as a `Duration`.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs_f64(self.sweep_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl_secs: 300.0,
            fallback_ttl_secs: 60.0,
            success_ttl_multiplier: 2.0,
            slow_call_threshold_secs: 2.0,
            slow_call_ttl_multiplier: 1.5,
            sweep_interval_secs: 300.0,
        }
    }
}

/// Batch grouping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Release a batch once this many items are queued.
    #[serde(default = "default_5_usize")]
    pub batch_size: usize,
    /// Release a batch this long after its oldest item was queued.
    #[serde(default = "default_0_1")]
    pub batch_timeout_secs: f64,
    /// Maximum similarity groups processed at once.
    #[serde(default = "default_3_usize")]
    pub max_concurrent_batches: usize,
}

impl BatchConfig {
    /// Batch release timeout as a `Duration`.
    #[must_use]
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.batch_timeout_secs)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_timeout_secs: 0.1,
            max_concurrent_batches: 3,
        }
    }
}

/// Fallback synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Use lexical rule-based synthesis instead of a generic line.
    #[serde(default = "default_true")]
    pub enable_intelligent_fallbacks: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enable_intelligent_fallbacks: true,
        }
    }
}

/// Host integration behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Start the cache sweep and background warming queue when a runtime is active.
    #[serde(default = "default_true")]
    pub enable_background_updates: bool,
    /// Player input shorter than this (after trimming) skips assessment.
    #[serde(default = "default_3_usize")]
    pub min_input_chars: usize,
    /// Entity cap in priority mode.
    #[serde(default = "default_3_usize")]
    pub priority_max_entities: usize,
    /// Cap on "present" NPCs when deriving targets from context.
    #[serde(default = "default_3_usize")]
    pub max_present_npcs: usize,
    /// Cap on active factions when deriving targets from context.
    #[serde(default = "default_2_usize")]
    pub max_active_factions: usize,
    /// Assumed per-entity cost of a naive sequential assessment (reporting only).
    #[serde(default = "default_1_5")]
    pub sequential_cost_per_entity_secs: f64,
    /// Minimum spacing between periodic metrics log lines.
    #[serde(default = "default_60_0")]
    pub metrics_log_interval_secs: f64,
}

impl IntegrationConfig {
    /// Metrics log interval as a `Duration`.
    #[must_use]
    pub fn metrics_log_interval(&self) -> Duration {
        Duration::from_secs_f64(self.metrics_log_interval_secs)
    }

    /// Sequential baseline cost as a `Duration`.
    #[must_use]
    pub fn sequential_cost_per_entity(&self) -> Duration {
        Duration::from_secs_f64(self.sequential_cost_per_entity_secs)
    }
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            enable_background_updates: true,
            min_input_chars: 3,
            priority_max_entities: 3,
            max_present_npcs: 3,
            max_active_factions: 2,
            sequential_cost_per_entity_secs: 1.5,
            metrics_log_interval_secs: 60.0,
        }
    }
}

/// LLM integration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the LLM API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Bearer token for OpenAI-compatible APIs.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model for priority (small, fast) requests.
    #[serde(default = "default_tier1_model")]
    pub tier1_model: String,
    /// Model for standard and background requests.
    #[serde(default = "default_tier2_model")]
    pub tier2_model: String,
    /// HTTP timeout per attempt in milliseconds.
    #[serde(default = "default_3000")]
    pub request_timeout_ms: u64,
    /// Ask the backend for JSON-only output.
    #[serde(default = "default_true")]
    pub structured_output: bool,
    /// Retries after the first attempt.
    #[serde(default = "default_1_u32")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            tier1_model: "qwen2.5:1.5b".to_string(),
            tier2_model: "mistral:7b-instruct".to_string(),
            request_timeout_ms: 3000,
            structured_output: true,
            max_retries: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_0_1() -> f64 { 0.1 }
fn default_1_5() -> f64 { 1.5 }
fn default_2_0() -> f64 { 2.0 }
fn default_3_0() -> f64 { 3.0 }
fn default_60_0() -> f64 { 60.0 }
fn default_300_0() -> f64 { 300.0 }
fn default_2_usize() -> usize { 2 }
fn default_3_usize() -> usize { 3 }
fn default_5_usize() -> usize { 5 }
fn default_1000() -> usize { 1000 }
fn default_1_u32() -> u32 { 1 }
fn default_3000() -> u64 { 3000 }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_tier1_model() -> String { "qwen2.5:1.5b".to_string() }
fn default_tier2_model() -> String { "mistral:7b-instruct".to_string() }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = WorldReactConfig::from_toml("").expect("empty config parses");
        assert_eq!(config.concurrency.max_concurrent_reactions, 5);
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.batch.batch_size, 5);
        assert!(config.fallback.enable_intelligent_fallbacks);
        assert!(config.integration.enable_background_updates);
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = WorldReactConfig::from_toml(
            r#"
            [concurrency]
            max_concurrent_reactions = 8
            reaction_timeout_secs = 2.0

            [cache]
            max_size = 50
            "#,
        )
        .expect("valid config");

        assert_eq!(config.concurrency.max_concurrent_reactions, 8);
        assert_eq!(config.concurrency.reaction_timeout(), Duration::from_secs(2));
        assert_eq!(config.concurrency.priority_timeout_secs, 1.5);
        assert_eq!(config.cache.max_size, 50);
        assert_eq!(config.cache.fallback_ttl_secs, 60.0);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = WorldReactConfig::from_toml("[concurrency]\nmax_concurrent_reactions = 0")
            .expect_err("zero concurrency must fail");
        assert!(matches!(err, ReactError::Config(_)));
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let mut config = WorldReactConfig::default();
        config.concurrency.reaction_timeout_secs = -1.0;
        assert!(config.validate().is_err());

        config.concurrency.reaction_timeout_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn timeout_above_ceiling_is_rejected() {
        let mut config = WorldReactConfig::default();
        config.concurrency.reaction_timeout_secs = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn durations_beyond_one_year_are_rejected() {
        let err = WorldReactConfig::from_toml("[cache]\ndefault_ttl_secs = 1e19").expect_err("huge ttl");
        assert!(matches!(err, ReactError::Config(_)));

        let err = WorldReactConfig::from_toml("[concurrency]\nmax_timeout_secs = 1e20").expect_err("huge ceiling");
        assert!(matches!(err, ReactError::Config(_)));

        let mut config = WorldReactConfig::default();
        config.cache.sweep_interval_secs = MAX_CONFIG_SECS * 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn ttl_multipliers_cannot_push_ttl_past_one_year() {
        let mut config = WorldReactConfig::default();
        config.cache.success_ttl_multiplier = 1e6;
        assert!(config.validate().is_err());

        let mut config = WorldReactConfig::default();
        config.cache.default_ttl_secs = MAX_CONFIG_SECS / 2.0;
        config.cache.success_ttl_multiplier = 2.0;
        config.cache.slow_call_ttl_multiplier = 1.5;
        assert!(config.validate().is_err());

        config.cache.slow_call_ttl_multiplier = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = WorldReactConfig::from_toml("[cache\nmax_size = ").expect_err("malformed");
        assert!(matches!(err, ReactError::Config(_)));
    }

    #[test]
    fn unknown_llm_provider_is_rejected() {
        let err = WorldReactConfig::from_toml("[llm]\nprovider = \"llama_cpp\"").expect_err("unknown provider");
        assert!(matches!(err, ReactError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("worldreact.toml");
        std::fs::write(&path, "[batch]\nbatch_size = 12\n").expect("write config");

        let config = WorldReactConfig::from_file(&path).expect("load");
        assert_eq!(config.batch.batch_size, 12);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = WorldReactConfig::from_file(std::path::Path::new("/nonexistent/worldreact.toml"))
            .expect_err("missing file");
        assert!(matches!(err, ReactError::Io(_)));
    }
}
