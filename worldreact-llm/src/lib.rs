//! # worldreact-llm: LLM boundary for worldreact
//!
//! The default [`ReactionProcessor`](worldreact_core::ReactionProcessor):
//! prompts a language model for a structured reaction and parses it.
//!
//! Supported backends:
//!   - **Ollama** (local, recommended default)
//!   - **OpenAI-compatible API** (Together, vLLM, llama.cpp server, etc.)
//!   - **None**: every call fails fast and the engine falls back to
//!     rule-based synthesis
//!
//! Timeouts, retries and schema checks happen here; turning failures into
//! fallback reactions is the runner's job.
//!
//! ```text
//! Priority assessments   → tier 1 (small local model)   [~100–500ms]
//! Standard / background  → tier 2 (large model)         [~0.5–3s]
//! All calls request JSON: {perception, narration, attitude_shift}
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod processor;
pub mod prompt;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use error::LlmError;
pub use processor::LlmReactionProcessor;
pub use types::{LlmRequest, LlmResponse, LlmTier, ReactionResponse};
