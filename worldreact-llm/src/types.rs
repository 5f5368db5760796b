//! Core types for LLM requests and responses.

use serde::{Deserialize, Serialize};
use worldreact_core::{ReactionData, RequestMode};

/// Which model a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmTier {
    /// Small local model (1B–3B params). Fast, cheap.
    SmallLocal,
    /// Large model (7B+ local or cloud API). Richer reactions.
    LargeModel,
}

impl LlmTier {
    /// Tier used for requests submitted on `mode`.
    ///
    /// Priority assessments run under a tighter timeout, so they go to the
    /// small model; everything else gets the large one.
    #[must_use]
    pub fn for_mode(mode: RequestMode) -> Self {
        match mode {
            RequestMode::Priority => Self::SmallLocal,
            RequestMode::Standard | RequestMode::Background => Self::LargeModel,
        }
    }
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt (narrator persona, rules, output format).
    pub system: String,
    /// User prompt (scene context and the player action).
    pub user: String,
    /// Which tier is this request?
    pub tier: LlmTier,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Ask the backend for JSON-only output where supported.
    pub json_mode: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// Create a small-model request.
    #[must_use]
    pub fn tier1(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            tier: LlmTier::SmallLocal,
            max_tokens: 150,
            temperature: 0.7,
            json_mode: false,
            timeout_ms: 5000,
        }
    }

    /// Create a large-model request.
    #[must_use]
    pub fn tier2(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            tier: LlmTier::LargeModel,
            max_tokens: 300,
            temperature: 0.8,
            json_mode: false,
            timeout_ms: 5000,
        }
    }

    /// Request JSON-only output.
    #[must_use]
    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A response from the LLM.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// How many tokens were generated.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model was used.
    pub model: String,
}

/// Structured reaction returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionResponse {
    /// How the entity perceives the player's action.
    pub perception: String,
    /// Narration the game master may use.
    pub narration: String,
    /// How the entity's attitude toward the player shifts, if at all.
    #[serde(default)]
    pub attitude_shift: Option<String>,
}

impl From<ReactionResponse> for ReactionData {
    fn from(response: ReactionResponse) -> Self {
        ReactionData {
            perception: response.perception,
            suggested_narration: response.narration,
            attitude_shift: response
                .attitude_shift
                .filter(|shift| !shift.trim().is_empty() && !shift.eq_ignore_ascii_case("none")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_requests_use_the_small_model() {
        assert_eq!(LlmTier::for_mode(RequestMode::Priority), LlmTier::SmallLocal);
        assert_eq!(LlmTier::for_mode(RequestMode::Standard), LlmTier::LargeModel);
        assert_eq!(LlmTier::for_mode(RequestMode::Background), LlmTier::LargeModel);
    }

    #[test]
    fn placeholder_attitude_shift_is_dropped() {
        let data: ReactionData = ReactionResponse {
            perception: "p".into(),
            narration: "n".into(),
            attitude_shift: Some("None".into()),
        }
        .into();
        assert!(data.attitude_shift.is_none());
    }
}
