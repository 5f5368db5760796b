//! Optimizer: the façade callers use to assess world reactions.
//!
//! ```text
//! player input + context
//!        │
//!        ▼
//!  target resolution ──► cache lookup ──hit──────────────────────┐
//!                             │                                  │
//!                            miss                                │
//!                             ▼                                  ▼
//!                 bounded concurrent dispatch ──► cache write ──► results
//! ```
//!
//! [`ReactionOptimizer::assess`] never fails. Timeouts and processor errors
//! are absorbed by the [`ConcurrencyRunner`] and come back as fallback
//! results, so every call yields one result per target.
//!
//! TTL policy for fresh results:
//!
//! | result                         | TTL                                  |
//! |--------------------------------|--------------------------------------|
//! | fallback (any reason)          | `fallback_ttl` (short, re-check soon)|
//! | success                        | `default_ttl × success_multiplier`   |
//! | success, slower than threshold | additionally `× slow_call_multiplier`|
//! | non-fallback failure           | `default_ttl`                        |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::info;

use crate::batch::{BatchHandler, BatchKey};
use crate::cache::ReactionCache;
use crate::config::WorldReactConfig;
use crate::error::Result;
use crate::metrics::{MetricsSnapshot, PerformanceMetrics};
use crate::processor::{FallbackSynthesizer, ReactionProcessor};
use crate::runner::ConcurrencyRunner;
use crate::types::{ReactionContext, ReactionRequest, ReactionResult, RequestMode};

/// Per-call knobs for [`ReactionOptimizer::assess_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssessOptions {
    /// Path the requests are attributed to.
    pub mode: RequestMode,
    /// Per-item timeout for this call; `None` uses the runner's current one.
    pub timeout: Option<Duration>,
}

impl Default for AssessOptions {
    fn default() -> Self {
        Self {
            mode: RequestMode::Standard,
            timeout: None,
        }
    }
}

struct OptimizerInner {
    config: WorldReactConfig,
    cache: ReactionCache,
    runner: ConcurrencyRunner,
    metrics: PerformanceMetrics,
}

/// Cache-first, bounded-concurrency reaction coordinator.
///
/// Cheap to clone; clones share the cache, runner and metrics.
#[derive(Clone)]
pub struct ReactionOptimizer {
    inner: Arc<OptimizerInner>,
}

impl ReactionOptimizer {
    /// Build an optimizer from a validated config.
    ///
    /// # Errors
    /// Returns `ReactError::Config` if the config is invalid.
    pub fn new(config: WorldReactConfig, fallback: Arc<dyn FallbackSynthesizer>) -> Result<Self> {
        config.validate()?;
        let cache = ReactionCache::new(config.cache.max_size)?;
        let runner = ConcurrencyRunner::new(
            config.concurrency.max_concurrent_reactions,
            config.concurrency.reaction_timeout(),
            config.concurrency.max_timeout(),
            fallback,
        )?;
        Ok(Self {
            inner: Arc::new(OptimizerInner {
                config,
                cache,
                runner,
                metrics: PerformanceMetrics::new(),
            }),
        })
    }

    /// Configuration this optimizer was built with.
    #[must_use]
    pub fn config(&self) -> &WorldReactConfig {
        &self.inner.config
    }

    /// The shared reaction cache.
    #[must_use]
    pub fn cache(&self) -> &ReactionCache {
        &self.inner.cache
    }

    /// The bounded concurrency runner.
    #[must_use]
    pub fn runner(&self) -> &ConcurrencyRunner {
        &self.inner.runner
    }

    /// Snapshot of process-lifetime metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Change the default per-item timeout.
    ///
    /// # Errors
    /// Returns `ReactError::Config` for a zero timeout or one above the ceiling.
    pub fn set_reaction_timeout(&self, timeout: Duration) -> Result<()> {
        self.inner.runner.set_timeout(timeout)?;
        info!(?timeout, "reaction timeout changed");
        Ok(())
    }

    /// Entities that should react when the caller names none.
    ///
    /// Active NPCs, then present NPCs (capped), then the location
    /// environment, then active factions (capped); duplicates and blanks
    /// are dropped.
    #[must_use]
    pub fn derive_targets(&self, context: &ReactionContext) -> Vec<String> {
        let limits = &self.inner.config.integration;
        let candidates = context
            .active_npcs
            .iter()
            .cloned()
            .chain(context.present_npcs.iter().take(limits.max_present_npcs).cloned())
            .chain(context.location_entity())
            .chain(context.active_factions.iter().take(limits.max_active_factions).cloned());
        dedupe(candidates)
    }

    /// TTL for a freshly computed result.
    #[must_use]
    pub fn ttl_for(&self, result: &ReactionResult) -> Duration {
        let policy = &self.inner.config.cache;
        if result.is_fallback || result.fallback_reason.is_some() {
            return policy.fallback_ttl();
        }
        let mut secs = policy.default_ttl_secs;
        if result.success {
            secs *= policy.success_ttl_multiplier;
        }
        if result.assessment_time > policy.slow_call_threshold() {
            secs *= policy.slow_call_ttl_multiplier;
        }
        Duration::try_from_secs_f64(secs).unwrap_or_else(|_| policy.default_ttl())
    }

    /// Assess how `targets` react to `player_input`.
    ///
    /// An empty `targets` slice means "derive them from context". Returns
    /// cache hits followed by freshly computed results.
    pub async fn assess(
        &self,
        player_input: &str,
        context: Arc<ReactionContext>,
        targets: &[String],
        processor: Arc<dyn ReactionProcessor>,
    ) -> Vec<ReactionResult> {
        self.assess_with(player_input, context, targets, processor, AssessOptions::default())
            .await
    }

    /// [`assess`](Self::assess) with per-call options.
    pub async fn assess_with(
        &self,
        player_input: &str,
        context: Arc<ReactionContext>,
        targets: &[String],
        processor: Arc<dyn ReactionProcessor>,
        options: AssessOptions,
    ) -> Vec<ReactionResult> {
        let started = Instant::now();
        let targets = if targets.is_empty() {
            self.derive_targets(&context)
        } else {
            dedupe(targets.iter().cloned())
        };

        let mut hits = Vec::new();
        let mut misses = Vec::new();
        for target in targets {
            let request = ReactionRequest::new(player_input, Arc::clone(&context), target, options.mode);
            match self.inner.cache.get(&request.cache_key) {
                Some(mut cached) => {
                    cached.from_cache = true;
                    hits.push(cached);
                }
                None => misses.push(request),
            }
        }

        let metrics = &self.inner.metrics;
        PerformanceMetrics::add(&metrics.total_requests, (hits.len() + misses.len()) as u64);
        PerformanceMetrics::add(&metrics.cache_hits, hits.len() as u64);
        PerformanceMetrics::add(&metrics.cache_misses, misses.len() as u64);

        let computed = self
            .compute_and_store(misses, processor, options.timeout)
            .await;

        let mut results = hits;
        results.extend(computed);
        self.record(&results, started.elapsed());
        results
    }

    /// Run `requests` through the runner and write every result into the cache.
    async fn compute_and_store(
        &self,
        requests: Vec<ReactionRequest>,
        processor: Arc<dyn ReactionProcessor>,
        timeout: Option<Duration>,
    ) -> Vec<ReactionResult> {
        if requests.is_empty() {
            return Vec::new();
        }
        let runner = &self.inner.runner;
        let timeout = timeout.unwrap_or_else(|| runner.timeout());
        PerformanceMetrics::add(&self.inner.metrics.concurrent_operations, requests.len() as u64);

        let keys: Vec<String> = requests.iter().map(|r| r.cache_key.clone()).collect();
        let results = runner.run_all_with_timeout(requests, processor, timeout).await;

        for (key, result) in keys.into_iter().zip(&results) {
            if result.timed_out() {
                PerformanceMetrics::add(&self.inner.metrics.timeouts, 1);
            }
            self.inner.cache.set(key, result.clone(), self.ttl_for(result));
        }
        results
    }

    fn record(&self, results: &[ReactionResult], elapsed: Duration) {
        let metrics = &self.inner.metrics;
        let successes = results.iter().filter(|r| r.success).count() as u64;
        let fallbacks = results.iter().filter(|r| r.is_fallback).count() as u64;
        PerformanceMetrics::add(&metrics.successful_requests, successes);
        PerformanceMetrics::add(&metrics.failed_requests, results.len() as u64 - successes);
        PerformanceMetrics::add(&metrics.fallbacks, fallbacks);
        metrics.record_latency(elapsed);

        if metrics.log_due(self.inner.config.integration.metrics_log_interval()) {
            let snapshot = metrics.snapshot();
            let cache = self.inner.cache.stats();
            info!(
                requests = snapshot.total_requests,
                hit_rate = format_args!("{:.1}%", snapshot.cache_hit_rate() * 100.0),
                success_rate = format_args!("{:.1}%", snapshot.success_rate() * 100.0),
                timeouts = snapshot.timeouts,
                fallbacks = snapshot.fallbacks,
                avg_latency_ms = snapshot.average_latency.as_millis() as u64,
                cache_size = cache.size,
                "reaction optimizer metrics"
            );
        }
    }

    /// A [`BatchHandler`] that computes groups through this optimizer and
    /// warms the cache with the results.
    #[must_use]
    pub fn batch_handler(&self, processor: Arc<dyn ReactionProcessor>) -> Arc<dyn BatchHandler> {
        Arc::new(CacheWarmingHandler {
            optimizer: self.clone(),
            processor,
        })
    }
}

struct CacheWarmingHandler {
    optimizer: ReactionOptimizer,
    processor: Arc<dyn ReactionProcessor>,
}

#[async_trait]
impl BatchHandler for CacheWarmingHandler {
    async fn process_group(
        &self,
        _key: BatchKey,
        requests: Vec<ReactionRequest>,
    ) -> Result<Vec<ReactionResult>> {
        Ok(self
            .optimizer
            .compute_and_store(requests, Arc::clone(&self.processor), None)
            .await)
    }
}

fn dedupe(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        let item = item.trim().to_string();
        if !item.is_empty() && !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}
