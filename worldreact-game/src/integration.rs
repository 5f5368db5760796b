//! Integration layer: attaches the reaction engine to the host game loop.
//!
//! Entry points:
//! - [`ReactionIntegration::assess_reaction`] for async hosts,
//! - [`ReactionIntegration::assess_reaction_blocking`] for synchronous call
//!   sites outside any tokio runtime,
//! - [`ReactionIntegration::assess_batch`] for many independent actions,
//! - [`ReactionIntegration::process_response`] to gate, assess and merge in
//!   one step.
//!
//! When constructed inside a tokio runtime with background updates enabled,
//! the integration also owns a periodic cache sweep and a batch grouper for
//! cache warming. Outside a runtime both are skipped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use worldreact_core::batch::{BatchProcessor, BatchStats, PendingReaction};
use worldreact_core::cache::CacheStats;
use worldreact_core::metrics::MetricsSnapshot;
use worldreact_core::processor::GenericFallback;
use worldreact_core::{
    FallbackReason, FallbackSynthesizer, ReactionContext, ReactionOptimizer, ReactionProcessor,
    ReactionRequest, RequestMode, Result, WorldReactConfig,
};
use worldreact_llm::LlmReactionProcessor;

use crate::assessor::{AssessorStats, ReactionAssessmentReport, ReactionAssessor, rank_by_priority};
use crate::fallback::IntelligentFallback;
use crate::response::{GameResponse, ReactionMetadata, ResponseType};

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Aggregate integration statistics.
#[derive(Debug, Clone)]
pub struct IntegrationStats {
    /// Assessment calls made through this integration.
    pub total_calls: u64,
    /// Responses for which assessment was skipped.
    pub skipped_calls: u64,
    /// Blocking calls made from inside a runtime and answered with a synthesized fallback.
    pub reentrant_fallbacks: u64,
    /// Batch entry point invocations.
    pub batch_calls: u64,
    /// Wiring failures turned into degraded reports.
    pub integration_errors: u64,
    /// Requests handed to the background warming queue.
    pub background_queued: u64,
    /// Running mean of assessment call time.
    pub average_processing_time: Duration,
    /// Cache state.
    pub cache: CacheStats,
    /// Optimizer counters.
    pub metrics: MetricsSnapshot,
    /// Assessor totals.
    pub assessor: AssessorStats,
    /// Warming queue counters, when background updates run.
    pub batch: Option<BatchStats>,
}

#[derive(Default)]
struct StatsInner {
    total_calls: u64,
    skipped_calls: u64,
    reentrant_fallbacks: u64,
    batch_calls: u64,
    integration_errors: u64,
    background_queued: u64,
    samples: u64,
    mean_secs: f64,
}

impl StatsInner {
    fn record_call(&mut self, elapsed: Duration) {
        self.total_calls += 1;
        self.samples += 1;
        self.mean_secs += (elapsed.as_secs_f64() - self.mean_secs) / self.samples as f64;
    }
}

struct Background {
    sweep: JoinHandle<()>,
    batches: BatchProcessor,
}

// ---------------------------------------------------------------------------
// Integration
// ---------------------------------------------------------------------------

/// The host-facing handle to the reaction engine.
pub struct ReactionIntegration {
    assessor: Arc<ReactionAssessor>,
    fallback: Arc<dyn FallbackSynthesizer>,
    background: Option<Background>,
    stats: Mutex<StatsInner>,
}

impl ReactionIntegration {
    /// Wire up the engine.
    ///
    /// Background work starts only when `enable_background_updates` is set
    /// and a tokio runtime is active; otherwise it is skipped, not an error.
    ///
    /// # Errors
    /// Returns `ReactError::Config` if the configuration is invalid.
    pub fn new(config: WorldReactConfig, processor: Arc<dyn ReactionProcessor>) -> Result<Self> {
        let fallback: Arc<dyn FallbackSynthesizer> = if config.fallback.enable_intelligent_fallbacks {
            Arc::new(IntelligentFallback)
        } else {
            Arc::new(GenericFallback)
        };
        let optimizer = ReactionOptimizer::new(config, Arc::clone(&fallback))?;

        let background = if optimizer.config().integration.enable_background_updates {
            Self::start_background(&optimizer, &processor)?
        } else {
            None
        };

        info!(
            max_concurrent = optimizer.runner().max_concurrent(),
            timeout = ?optimizer.runner().timeout(),
            cache_size = optimizer.config().cache.max_size,
            background = background.is_some(),
            "reaction integration ready"
        );

        Ok(Self {
            assessor: Arc::new(ReactionAssessor::new(optimizer, processor)),
            fallback,
            background,
            stats: Mutex::new(StatsInner::default()),
        })
    }

    /// Wire up the engine with the LLM processor described by `config.llm`.
    ///
    /// # Errors
    /// Returns `ReactError::Config` for an invalid configuration or an
    /// unusable LLM backend.
    pub fn with_llm(config: WorldReactConfig) -> Result<Self> {
        let processor = LlmReactionProcessor::from_config(&config.llm)?;
        Self::new(config, Arc::new(processor))
    }

    fn start_background(
        optimizer: &ReactionOptimizer,
        processor: &Arc<dyn ReactionProcessor>,
    ) -> Result<Option<Background>> {
        let Ok(handle) = Handle::try_current() else {
            debug!("no tokio runtime active; background sweep and cache warming skipped");
            return Ok(None);
        };
        let config = optimizer.config();
        let batches = BatchProcessor::spawn(&config.batch, optimizer.batch_handler(Arc::clone(processor)))?;
        let sweep = handle.spawn(sweep_loop(optimizer.clone(), config.cache.sweep_interval()));
        Ok(Some(Background { sweep, batches }))
    }

    /// The assessor behind this integration.
    #[must_use]
    pub fn assessor(&self) -> &ReactionAssessor {
        &self.assessor
    }

    /// The shared optimizer.
    #[must_use]
    pub fn optimizer(&self) -> &ReactionOptimizer {
        self.assessor.optimizer()
    }

    /// Whether the background sweep and warming queue are running.
    #[must_use]
    pub fn background_active(&self) -> bool {
        self.background.is_some()
    }

    /// Change the default per-entity timeout.
    ///
    /// # Errors
    /// Returns `ReactError::Config` if the timeout is rejected; the old one stays.
    pub fn set_reaction_timeout(&self, timeout: Duration) -> Result<()> {
        self.optimizer().set_reaction_timeout(timeout)
    }

    /// Assess how the world reacts to `player_input`.
    ///
    /// `targets` may be empty to derive them from context. In priority mode
    /// the most relevant entities are selected from context instead and
    /// `targets` is ignored.
    pub async fn assess_reaction(
        &self,
        player_input: &str,
        context: impl Into<Arc<ReactionContext>>,
        targets: &[String],
        priority: bool,
    ) -> ReactionAssessmentReport {
        let started = Instant::now();
        let context = context.into();
        let report = if priority {
            self.assessor
                .assess_priority_reactions(player_input, context, None)
                .await
        } else {
            self.assessor.assess(player_input, context, targets).await
        };
        self.stats.lock().record_call(started.elapsed());
        report
    }

    /// Synchronous entry point.
    ///
    /// Outside a tokio runtime this drives the async path to completion on a
    /// private current-thread runtime. Inside one it never blocks: nested
    /// `block_on` is not allowed, so it answers immediately with synthesized
    /// fallbacks instead.
    pub fn assess_reaction_blocking(
        &self,
        player_input: &str,
        context: impl Into<Arc<ReactionContext>>,
        targets: &[String],
        priority: bool,
    ) -> ReactionAssessmentReport {
        let context = context.into();
        if Handle::try_current().is_ok() {
            warn!("blocking assessment requested from inside a tokio runtime; answering with fallbacks");
            self.stats.lock().reentrant_fallbacks += 1;
            return self.synthesized_report(player_input, &context, targets);
        }

        match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime.block_on(self.assess_reaction(player_input, context, targets, priority)),
            Err(e) => {
                warn!(error = %e, "could not start a runtime for a blocking assessment");
                self.stats.lock().integration_errors += 1;
                ReactionAssessmentReport::degraded(format!("could not start runtime: {e}"))
            }
        }
    }

    /// Assess many independent `(input, context)` pairs concurrently.
    ///
    /// Returns one report per pair, in input order. A pair whose task fails
    /// gets a degraded report; the others are unaffected.
    pub async fn assess_batch(&self, items: Vec<(String, ReactionContext)>) -> Vec<ReactionAssessmentReport> {
        self.stats.lock().batch_calls += 1;
        let started = Instant::now();

        let mut reports: Vec<ReactionAssessmentReport> = (0..items.len())
            .map(|_| ReactionAssessmentReport::degraded("assessment task failed"))
            .collect();
        let mut tasks = JoinSet::new();
        for (index, (input, context)) in items.into_iter().enumerate() {
            let assessor = Arc::clone(&self.assessor);
            tasks.spawn(async move { (index, assessor.assess(&input, Arc::new(context), &[]).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => reports[index] = report,
                Err(e) => {
                    warn!(error = %e, "batch assessment task failed");
                    self.stats.lock().integration_errors += 1;
                }
            }
        }

        debug!(items = reports.len(), elapsed = ?started.elapsed(), "batch assessment complete");
        reports
    }

    /// Whether assessing reactions for `response` is worth it.
    ///
    /// Skipped for out-of-world response types, suppressed responses and
    /// trivially short input.
    #[must_use]
    pub fn should_assess(&self, response: &GameResponse, player_input: &str) -> bool {
        if response.suppress_reactions || !response.response_type.is_in_world() {
            return false;
        }
        let min_chars = self.optimizer().config().integration.min_input_chars;
        player_input.trim().chars().count() >= min_chars
    }

    /// Merge the top reaction of `report` into `response`.
    ///
    /// Fallback narration is appended to the host's text; authoritative
    /// narration replaces it. Narration is only touched when the host set
    /// one. Reaction metadata is always attached when there is a reaction.
    #[must_use]
    pub fn enhance_response(&self, mut response: GameResponse, report: &ReactionAssessmentReport) -> GameResponse {
        let Some(primary) = report.primary() else {
            return response;
        };

        let suggestion = primary.reaction.suggested_narration.trim();
        if let Some(text) = response.narration.as_mut() {
            if !suggestion.is_empty() {
                if !primary.is_fallback {
                    *text = suggestion.to_string();
                } else if text.trim().is_empty() {
                    *text = suggestion.to_string();
                } else {
                    text.push_str("\n\n");
                    text.push_str(suggestion);
                }
            }
        }

        response.reaction = Some(ReactionMetadata {
            primary_target: primary.target_entity.clone(),
            perception: primary.reaction.perception.clone(),
            attitude_shift: primary.reaction.attitude_shift.clone(),
            is_fallback: primary.is_fallback,
            entities_assessed: report.entities_assessed,
            processing_time: report.total_time,
        });
        response
    }

    /// Gate, assess and merge in one step.
    ///
    /// Combat responses use priority mode.
    pub async fn process_response(
        &self,
        response: GameResponse,
        player_input: &str,
        context: impl Into<Arc<ReactionContext>>,
    ) -> GameResponse {
        if !self.should_assess(&response, player_input) {
            self.stats.lock().skipped_calls += 1;
            debug!(response_type = ?response.response_type, "reaction assessment skipped");
            return response;
        }
        let priority = response.response_type == ResponseType::Combat;
        let report = self.assess_reaction(player_input, context, &[], priority).await;
        self.enhance_response(response, &report)
    }

    /// Warm the cache for `entity` in the background.
    ///
    /// Without background updates the handle resolves immediately with a
    /// synthesized fallback and nothing is cached.
    pub fn queue_background_reaction(
        &self,
        player_input: &str,
        context: impl Into<Arc<ReactionContext>>,
        entity: &str,
    ) -> PendingReaction {
        let request = ReactionRequest::new(player_input, context.into(), entity, RequestMode::Background);
        match &self.background {
            Some(background) => {
                self.stats.lock().background_queued += 1;
                background.batches.submit(request)
            }
            None => PendingReaction::ready(self.fallback.synthesize(&request, FallbackReason::Synthesized)),
        }
    }

    /// Snapshot of integration, cache, optimizer and assessor statistics.
    #[must_use]
    pub fn stats(&self) -> IntegrationStats {
        let inner = self.stats.lock();
        let optimizer = self.optimizer();
        IntegrationStats {
            total_calls: inner.total_calls,
            skipped_calls: inner.skipped_calls,
            reentrant_fallbacks: inner.reentrant_fallbacks,
            batch_calls: inner.batch_calls,
            integration_errors: inner.integration_errors,
            background_queued: inner.background_queued,
            average_processing_time: Duration::from_secs_f64(inner.mean_secs.max(0.0)),
            cache: optimizer.cache().stats(),
            metrics: optimizer.metrics(),
            assessor: self.assessor.stats(),
            batch: self.background.as_ref().map(|b| b.batches.stats()),
        }
    }

    /// Stop background work, flushing queued warming requests first.
    pub async fn shutdown(mut self) {
        if let Some(background) = self.background.take() {
            background.sweep.abort();
            background.batches.shutdown().await;
        }
        info!("reaction integration shut down");
    }

    fn synthesized_report(
        &self,
        player_input: &str,
        context: &Arc<ReactionContext>,
        targets: &[String],
    ) -> ReactionAssessmentReport {
        let targets = if targets.is_empty() {
            self.optimizer().derive_targets(context)
        } else {
            targets.to_vec()
        };
        let results: Vec<_> = targets
            .into_iter()
            .map(|target| {
                let request = ReactionRequest::new(player_input, Arc::clone(context), target, RequestMode::Standard);
                self.fallback.synthesize(&request, FallbackReason::Synthesized)
            })
            .collect();

        ReactionAssessmentReport {
            success: false,
            entities_assessed: results.len(),
            successful_assessments: 0,
            results: rank_by_priority(results),
            error: Some("re-entrant blocking call; synthesized fallback".into()),
            ..ReactionAssessmentReport::default()
        }
    }
}

impl Drop for ReactionIntegration {
    fn drop(&mut self) {
        if let Some(background) = &self.background {
            background.sweep.abort();
        }
    }
}

async fn sweep_loop(optimizer: ReactionOptimizer, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; nothing can have expired yet.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let removed = optimizer.cache().sweep_expired();
        debug!(removed, remaining = optimizer.cache().len(), "background cache sweep");
    }
}
