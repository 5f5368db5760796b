//! # WorldReact Core Library
//!
//! Performance layer for AI-driven world reactions. When a player acts, the
//! NPCs, factions and environment around them each need an assessment of how
//! they react; computing those assessments is slow and occasionally fails.
//! This crate makes that affordable:
//!
//! - **Cache**: TTL + LRU store of past reactions ([`cache`])
//! - **Runner**: bounded concurrency with per-item timeouts ([`runner`])
//! - **Batch**: similarity grouping for background work ([`batch`])
//! - **Optimizer**: the cache-first façade tying them together ([`optimizer`])
//!
//! ## Performance Contract
//!
//! - Cache key derivation: < 5μs
//! - Cache hit (lookup + clone): < 10μs
//! - An assessment never takes longer than the per-item timeout plus queueing
//!   behind the concurrency cap, and never returns an error.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod metrics;
pub mod optimizer;
pub mod processor;
pub mod runner;
pub mod types;

pub use cache::ReactionCache;
pub use config::WorldReactConfig;
pub use error::{ReactError, Result};
pub use optimizer::{AssessOptions, ReactionOptimizer};
pub use processor::{FallbackSynthesizer, ReactionProcessor};
pub use types::*;
