//! Integration tests: host-facing flows through `ReactionIntegration`.
//!
//! Gating, narration merge, priority routing for combat, batch ordering,
//! the synchronous entry point inside and outside a runtime, and background
//! cache warming.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use worldreact_core::processor::FnProcessor;
use worldreact_core::{
    Disposition, ReactError, ReactionContext, ReactionData, ReactionProcessor, ReactionRequest,
    ReactionResult, RequestMode, WorldReactConfig,
};
use worldreact_game::{GameResponse, ReactionIntegration, ResponseType};

fn config(background: bool) -> WorldReactConfig {
    let mut config = WorldReactConfig::default();
    config.integration.enable_background_updates = background;
    config
}

fn market(player: &str, npc: &str) -> ReactionContext {
    let mut ctx = ReactionContext::new(player, "market");
    ctx.active_npcs = vec![npc.to_string()];
    ctx
}

/// Answers after `delay`, records request modes and counts calls.
struct Recorder {
    calls: Arc<AtomicUsize>,
    modes: Arc<Mutex<Vec<RequestMode>>>,
}

fn recording(delay: Duration) -> (Arc<dyn ReactionProcessor>, Recorder) {
    let recorder = Recorder {
        calls: Arc::new(AtomicUsize::new(0)),
        modes: Arc::new(Mutex::new(Vec::new())),
    };
    let calls = Arc::clone(&recorder.calls);
    let modes = Arc::clone(&recorder.modes);
    let processor = FnProcessor::new(move |request: ReactionRequest| {
        let calls = Arc::clone(&calls);
        let modes = Arc::clone(&modes);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            modes.lock().push(request.mode);
            tokio::time::sleep(delay).await;
            Ok::<_, ReactError>(ReactionResult::success(
                request.target_entity.clone(),
                ReactionData {
                    perception: format!("{} noticed", request.target_entity),
                    suggested_narration: format!("{} reacts to you.", request.target_entity),
                    attitude_shift: None,
                },
            ))
        }
    });
    (Arc::new(processor), recorder)
}

// ---------------------------------------------------------------------------
// process_response
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn authoritative_reaction_replaces_narration() {
    let (processor, recorder) = recording(Duration::from_millis(300));
    let integration = ReactionIntegration::new(config(false), processor).expect("integration");

    let response = GameResponse::new(ResponseType::Narrative, "You greet the merchant.");
    let enhanced = integration
        .process_response(response, "greet the merchant", market("player_1", "npc_merchant"))
        .await;

    assert_eq!(enhanced.narration.as_deref(), Some("npc_merchant reacts to you."));
    let meta = enhanced.reaction.expect("reaction metadata");
    assert_eq!(meta.primary_target, "npc_merchant");
    assert_eq!(meta.entities_assessed, 2);
    assert!(!meta.is_fallback);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 2);
    assert!(recorder.modes.lock().iter().all(|m| *m == RequestMode::Standard));
    assert_eq!(integration.stats().total_calls, 1);
}

#[tokio::test]
async fn out_of_world_responses_are_untouched() {
    let (processor, recorder) = recording(Duration::ZERO);
    let integration = ReactionIntegration::new(config(false), processor).expect("integration");

    let response = GameResponse::new(ResponseType::System, "Game saved.");
    let out = integration
        .process_response(response.clone(), "save the game", market("player_1", "npc_merchant"))
        .await;

    assert_eq!(out, response);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    let stats = integration.stats();
    assert_eq!(stats.skipped_calls, 1);
    assert_eq!(stats.total_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn combat_runs_in_priority_mode() {
    let (processor, recorder) = recording(Duration::from_millis(100));
    let integration = ReactionIntegration::new(config(false), processor).expect("integration");

    let mut ctx = ReactionContext::new("player_1", "road");
    ctx.combat_npcs = vec!["npc_bandit".into()];
    let response = GameResponse::new(ResponseType::Combat, "Steel rings out.");
    let enhanced = integration.process_response(response, "I strike the bandit", ctx).await;

    assert_eq!(enhanced.reaction.expect("metadata").primary_target, "npc_bandit");
    let modes = recorder.modes.lock();
    assert!(!modes.is_empty());
    assert!(modes.iter().all(|m| *m == RequestMode::Priority));
    assert_eq!(integration.assessor().stats().priority_assessments, 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_reaction_appends_rule_based_narration() {
    let (processor, _) = recording(Duration::from_secs(10));
    let integration = ReactionIntegration::new(config(false), processor).expect("integration");

    let mut ctx = market("player_1", "npc_guard");
    ctx.dispositions.insert("npc_guard".into(), Disposition::Hostile);
    let response = GameResponse::new(ResponseType::Narrative, "You raise your fist.");
    let enhanced = integration.process_response(response, "I attack the guard", ctx).await;

    assert_eq!(
        enhanced.narration.as_deref(),
        Some("You raise your fist.\n\nThe guard squares up, clearly ready to answer in kind.")
    );
    let meta = enhanced.reaction.expect("metadata");
    assert!(meta.is_fallback);
    assert_eq!(meta.attitude_shift.as_deref(), Some("hostility hardens"));
    assert_eq!(integration.stats().metrics.timeouts, 2);
}

// ---------------------------------------------------------------------------
// Batch and blocking entry points
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn batch_reports_keep_input_order() {
    let (processor, _) = recording(Duration::from_millis(50));
    let integration = ReactionIntegration::new(config(false), processor).expect("integration");

    let items = vec![
        ("greet the smith".to_string(), market("player_1", "npc_smith")),
        ("ask the baker about bread".to_string(), market("player_2", "npc_baker")),
        ("wave at the guard".to_string(), market("player_3", "npc_guard")),
    ];
    let reports = integration.assess_batch(items).await;

    let primaries: Vec<_> = reports
        .iter()
        .map(|r| r.primary().expect("primary").target_entity.as_str())
        .collect();
    assert_eq!(primaries, ["npc_smith", "npc_baker", "npc_guard"]);
    assert!(reports.iter().all(|r| r.success));
    assert_eq!(integration.stats().batch_calls, 1);
    assert_eq!(integration.stats().integration_errors, 0);
}

#[test]
fn blocking_call_outside_runtime_runs_to_completion() {
    let (processor, recorder) = recording(Duration::ZERO);
    let integration = ReactionIntegration::new(config(true), processor).expect("integration");
    assert!(!integration.background_active());

    let report = integration.assess_reaction_blocking(
        "greet the merchant",
        market("player_1", "npc_merchant"),
        &["npc_merchant".to_string()],
        false,
    );

    assert!(report.success);
    assert_eq!(report.entities_assessed, 1);
    assert!(!report.primary().expect("primary").is_fallback);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blocking_call_inside_runtime_answers_with_fallbacks() {
    let (processor, recorder) = recording(Duration::ZERO);
    let integration = ReactionIntegration::new(config(false), processor).expect("integration");

    let report = integration.assess_reaction_blocking(
        "hello there",
        market("player_1", "npc_merchant"),
        &[],
        false,
    );

    assert!(!report.success);
    assert!(report.error.is_some());
    assert_eq!(report.entities_assessed, 2);
    assert!(report.results.iter().all(|r| r.result.is_fallback));
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(integration.stats().reentrant_fallbacks, 1);
}

// ---------------------------------------------------------------------------
// Background warming
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn background_reaction_warms_the_cache() {
    let (processor, recorder) = recording(Duration::from_millis(100));
    let integration = ReactionIntegration::new(config(true), processor).expect("integration");
    assert!(integration.background_active());

    let ctx = Arc::new(market("player_1", "npc_merchant"));
    let warmed = integration
        .queue_background_reaction("greet the merchant", Arc::clone(&ctx), "npc_merchant")
        .wait()
        .await;
    assert!(warmed.success);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);

    let report = integration
        .assess_reaction("greet the merchant", ctx, &["npc_merchant".to_string()], false)
        .await;
    assert_eq!(report.optimization.cache_hits, 1);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);

    let stats = integration.stats();
    assert_eq!(stats.background_queued, 1);
    assert_eq!(stats.batch.expect("batch stats").submitted, 1);
    integration.shutdown().await;
}

#[tokio::test]
async fn background_request_without_queue_resolves_immediately() {
    let (processor, recorder) = recording(Duration::ZERO);
    let integration = ReactionIntegration::new(config(false), processor).expect("integration");

    let result = integration
        .queue_background_reaction("wave", market("player_1", "npc_merchant"), "npc_merchant")
        .wait()
        .await;

    assert!(result.is_fallback);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    assert!(integration.optimizer().cache().is_empty());
}
