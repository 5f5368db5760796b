//! Reaction assessor: domain shape on top of the optimizer.
//!
//! ```text
//! assess()                    assess_priority_reactions()
//!    │                              │ dialogue → combat → important → env
//!    │                              │ (dedupe, cap), tighter timeout
//!    └──────────────┬───────────────┘
//!                   ▼
//!          ReactionOptimizer::assess_with
//!                   │
//!                   ▼
//!   rank: NPC > faction > environment > unknown,
//!         successes before fallbacks within a kind
//!                   │
//!                   ▼
//!        ReactionAssessmentReport
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;
use worldreact_core::{
    AssessOptions, ReactionContext, ReactionOptimizer, ReactionProcessor, ReactionResult, RequestMode,
};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// One result annotated with its position in the priority order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedReaction {
    /// 1-based rank; 1 is the most relevant reaction.
    pub rank: usize,
    /// Number of results in the report.
    pub total: usize,
    /// The reaction itself.
    pub result: ReactionResult,
}

/// How much work the optimizer saved on one assessment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizationStats {
    /// Results served from the cache.
    pub cache_hits: usize,
    /// Results computed through the bounded runner.
    pub concurrent_entities: usize,
    /// Estimated saving against assessing every entity sequentially.
    pub time_saved: Duration,
}

/// What the host receives for one player action.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReactionAssessmentReport {
    /// `false` only when the assessment could not run normally.
    pub success: bool,
    /// Entities that were assessed.
    pub entities_assessed: usize,
    /// Results that are authoritative (not fallbacks).
    pub successful_assessments: usize,
    /// Results in priority order.
    pub results: Vec<RankedReaction>,
    /// Wall time for the whole assessment.
    pub total_time: Duration,
    /// Cache and concurrency statistics.
    pub optimization: OptimizationStats,
    /// Why the report is degraded, when it is.
    pub error: Option<String>,
}

impl ReactionAssessmentReport {
    /// A degraded report with no results.
    #[must_use]
    pub fn degraded(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// The top-ranked reaction, if any.
    #[must_use]
    pub fn primary(&self) -> Option<&ReactionResult> {
        self.results.first().map(|ranked| &ranked.result)
    }

    /// The report as a JSON value, for hosts that pass reports across a
    /// scripting or network boundary.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Running totals across every assessment made by one assessor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssessorStats {
    /// Assessments run (priority ones included).
    pub assessments: u64,
    /// Priority-mode assessments.
    pub priority_assessments: u64,
    /// Entities computed concurrently through the runner.
    pub concurrent_assessments: u64,
    /// Fallback results produced.
    pub fallbacks_generated: u64,
    /// Cumulative estimated saving against a sequential baseline.
    pub time_saved: Duration,
}

// ---------------------------------------------------------------------------
// Priority ordering
// ---------------------------------------------------------------------------

/// Sort `results` by entity kind, then successes before fallbacks, and rank them.
///
/// The sort is stable, so equal results keep their assessment order.
#[must_use]
pub fn rank_by_priority(mut results: Vec<ReactionResult>) -> Vec<RankedReaction> {
    results.sort_by_key(|r| (r.target_kind().priority(), r.is_fallback));
    let total = results.len();
    results
        .into_iter()
        .enumerate()
        .map(|(i, result)| RankedReaction {
            rank: i + 1,
            total,
            result,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Assessor
// ---------------------------------------------------------------------------

/// Assesses reactions through a shared [`ReactionOptimizer`].
pub struct ReactionAssessor {
    optimizer: ReactionOptimizer,
    processor: Arc<dyn ReactionProcessor>,
    stats: Mutex<AssessorStats>,
}

impl ReactionAssessor {
    /// Create an assessor computing misses with `processor`.
    #[must_use]
    pub fn new(optimizer: ReactionOptimizer, processor: Arc<dyn ReactionProcessor>) -> Self {
        Self {
            optimizer,
            processor,
            stats: Mutex::new(AssessorStats::default()),
        }
    }

    /// The underlying optimizer.
    #[must_use]
    pub fn optimizer(&self) -> &ReactionOptimizer {
        &self.optimizer
    }

    /// The processor used for cache misses.
    #[must_use]
    pub fn processor(&self) -> &Arc<dyn ReactionProcessor> {
        &self.processor
    }

    /// Assess `targets` (derived from context when empty).
    pub async fn assess(
        &self,
        player_input: &str,
        context: Arc<ReactionContext>,
        targets: &[String],
    ) -> ReactionAssessmentReport {
        self.run(player_input, context, targets, AssessOptions::default())
            .await
    }

    /// Assess only the most relevant entities under the tighter priority timeout.
    ///
    /// `max_entities` defaults to `integration.priority_max_entities`.
    pub async fn assess_priority_reactions(
        &self,
        player_input: &str,
        context: Arc<ReactionContext>,
        max_entities: Option<usize>,
    ) -> ReactionAssessmentReport {
        let config = self.optimizer.config();
        let cap = max_entities.unwrap_or(config.integration.priority_max_entities);
        let mut targets = Self::select_priority_entities(&context, cap);
        if targets.is_empty() {
            targets = self.optimizer.derive_targets(&context);
            targets.truncate(cap);
        }
        debug!(?targets, "priority assessment");

        let options = AssessOptions {
            mode: RequestMode::Priority,
            timeout: Some(
                config
                    .concurrency
                    .priority_timeout()
                    .min(self.optimizer.runner().timeout()),
            ),
        };
        self.stats.lock().priority_assessments += 1;
        self.run(player_input, context, &targets, options).await
    }

    /// Most relevant entities for a fast response: NPCs in dialogue, then in
    /// combat, then the location's important NPCs, then the location itself.
    #[must_use]
    pub fn select_priority_entities(context: &ReactionContext, max_entities: usize) -> Vec<String> {
        let mut selected: Vec<String> = Vec::with_capacity(max_entities);
        let candidates = context
            .dialogue_npcs
            .iter()
            .chain(&context.combat_npcs)
            .chain(&context.important_npcs)
            .cloned()
            .chain(context.location_entity());

        for candidate in candidates {
            if selected.len() >= max_entities {
                break;
            }
            let candidate = candidate.trim();
            if !candidate.is_empty() && !selected.iter().any(|s| s == candidate) {
                selected.push(candidate.to_string());
            }
        }
        selected
    }

    /// Snapshot of running totals.
    #[must_use]
    pub fn stats(&self) -> AssessorStats {
        self.stats.lock().clone()
    }

    async fn run(
        &self,
        player_input: &str,
        context: Arc<ReactionContext>,
        targets: &[String],
        options: AssessOptions,
    ) -> ReactionAssessmentReport {
        let started = Instant::now();
        let results = self
            .optimizer
            .assess_with(player_input, context, targets, Arc::clone(&self.processor), options)
            .await;
        let total_time = started.elapsed();

        let entities_assessed = results.len();
        let cache_hits = results.iter().filter(|r| r.from_cache).count();
        let concurrent_entities = entities_assessed - cache_hits;
        let fallbacks = results.iter().filter(|r| r.is_fallback && !r.from_cache).count();
        let successful_assessments = results.iter().filter(|r| !r.is_fallback).count();

        let per_entity = self.optimizer.config().integration.sequential_cost_per_entity();
        let baseline = per_entity.saturating_mul(u32::try_from(entities_assessed).unwrap_or(u32::MAX));
        let time_saved = baseline.saturating_sub(total_time);

        {
            let mut stats = self.stats.lock();
            stats.assessments += 1;
            stats.concurrent_assessments += concurrent_entities as u64;
            stats.fallbacks_generated += fallbacks as u64;
            stats.time_saved += time_saved;
        }

        ReactionAssessmentReport {
            success: true,
            entities_assessed,
            successful_assessments,
            results: rank_by_priority(results),
            total_time,
            optimization: OptimizationStats {
                cache_hits,
                concurrent_entities,
                time_saved,
            },
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldreact_core::{FallbackReason, ReactionData};

    fn ok(entity: &str) -> ReactionResult {
        ReactionResult::success(entity, ReactionData::default())
    }

    #[test]
    fn ranks_by_kind_then_quality() {
        let results = vec![
            ok("env_market"),
            ReactionResult::generic_fallback("npc_guard", FallbackReason::Timeout),
            ok("faction_guild"),
            ok("npc_merchant"),
            ok("dragon"),
        ];
        let ranked = rank_by_priority(results);
        let order: Vec<_> = ranked.iter().map(|r| r.result.target_entity.as_str()).collect();
        assert_eq!(order, ["npc_merchant", "npc_guard", "faction_guild", "env_market", "dragon"]);
        assert_eq!(ranked[0].rank, 1);
        assert!(ranked.iter().all(|r| r.total == 5));
    }

    #[test]
    fn priority_entities_follow_relevance_order() {
        let mut ctx = ReactionContext::new("player_1", "tavern");
        ctx.dialogue_npcs = vec!["npc_barkeep".into()];
        ctx.combat_npcs = vec!["npc_brawler".into(), "npc_barkeep".into()];
        ctx.important_npcs = vec!["npc_bard".into()];

        assert_eq!(
            ReactionAssessor::select_priority_entities(&ctx, 3),
            ["npc_barkeep", "npc_brawler", "npc_bard"]
        );
        assert_eq!(
            ReactionAssessor::select_priority_entities(&ctx, 10),
            ["npc_barkeep", "npc_brawler", "npc_bard", "env_tavern"]
        );
        assert!(ReactionAssessor::select_priority_entities(&ctx, 0).is_empty());
    }

    #[test]
    fn degraded_report_is_empty() {
        let report = ReactionAssessmentReport::degraded("runtime unavailable");
        assert!(!report.success);
        assert!(report.results.is_empty());
        assert!(report.primary().is_none());
        assert_eq!(report.error.as_deref(), Some("runtime unavailable"));
    }

    #[test]
    fn report_serializes_for_hosts() {
        let report = ReactionAssessmentReport {
            success: true,
            entities_assessed: 1,
            successful_assessments: 1,
            results: rank_by_priority(vec![ok("npc_merchant")]),
            ..ReactionAssessmentReport::default()
        };
        let json = report.to_json();
        assert_eq!(json["success"], true);
        assert_eq!(json["results"][0]["rank"], 1);
        assert_eq!(json["results"][0]["result"]["target_entity"], "npc_merchant");
    }
}
