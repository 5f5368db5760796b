//! # worldreact-game: game-master integration for worldreact
//!
//! Everything a host needs to ask "how does the world react to this?"
//! without blocking its turn:
//!
//! - `assessor`: entity selection, priority ranking and reports
//! - `fallback`: rule-based reactions from input tone and disposition
//! - `integration`: the host-facing handle: gating, sync/async/batch
//!   entry points, narration merge, background warming
//! - `response`: the host response types it reads and enriches
//! - `telemetry`: optional tracing subscriber setup
//!
//! ```text
//!   host turn ──▶ ReactionIntegration::process_response
//!                   │ should_assess? ── no ──▶ response unchanged
//!                   ▼
//!                 ReactionAssessor ──▶ ReactionOptimizer (cache + runner)
//!                   │                        │ miss
//!                   │                        ▼
//!                   │               LlmReactionProcessor / IntelligentFallback
//!                   ▼
//!                 enhance_response ──▶ narration + reaction metadata
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assessor;
pub mod fallback;
pub mod integration;
pub mod response;
pub mod telemetry;

pub use assessor::{ReactionAssessmentReport, ReactionAssessor};
pub use fallback::IntelligentFallback;
pub use integration::{IntegrationStats, ReactionIntegration};
pub use response::{GameResponse, ReactionMetadata, ResponseType};
pub use telemetry::init_tracing;
