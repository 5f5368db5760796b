//! [`ReactionProcessor`] backed by an LLM.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use worldreact_core::config::LlmConfig;
use worldreact_core::{ReactionData, ReactionProcessor, ReactionRequest, ReactionResult, Result};

use crate::client::LlmClient;
use crate::error::LlmError;
use crate::prompt;
use crate::types::{LlmRequest, LlmTier, ReactionResponse};

/// Computes reactions by prompting an LLM for structured JSON.
///
/// Failures surface as `ReactError`s and are turned into fallbacks by the
/// runner; this type never synthesizes fallbacks itself.
pub struct LlmReactionProcessor {
    client: Arc<LlmClient>,
    timeout_ms: u64,
    json_mode: bool,
}

impl LlmReactionProcessor {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self {
            client,
            timeout_ms: 3000,
            json_mode: true,
        }
    }

    /// Build client and processor from the `[llm]` config section.
    ///
    /// # Errors
    /// Returns `LlmError::ConfigError` if the client cannot be built.
    pub fn from_config(config: &LlmConfig) -> std::result::Result<Self, LlmError> {
        Ok(Self {
            client: Arc::new(LlmClient::from_config(config)?),
            timeout_ms: config.request_timeout_ms,
            json_mode: config.structured_output,
        })
    }

    /// Per-attempt HTTP timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &Arc<LlmClient> {
        &self.client
    }

    fn llm_request(&self, request: &ReactionRequest) -> LlmRequest {
        let (system, user) = prompt::reaction_prompt(request);
        let mut llm_request = match LlmTier::for_mode(request.mode) {
            LlmTier::SmallLocal => LlmRequest::tier1(system, user),
            LlmTier::LargeModel => LlmRequest::tier2(system, user),
        }
        .with_timeout(self.timeout_ms);
        if self.json_mode {
            llm_request = llm_request.with_json_mode();
        }
        llm_request
    }
}

#[async_trait]
impl ReactionProcessor for LlmReactionProcessor {
    async fn process(&self, request: &ReactionRequest) -> Result<ReactionResult> {
        let response = self.client.generate(&self.llm_request(request)).await?;
        let parsed: ReactionResponse = self.client.parse_structured(&response)?;
        if parsed.narration.trim().is_empty() {
            return Err(LlmError::SchemaValidation("empty narration".into()).into());
        }

        debug!(
            entity = %request.target_entity,
            model = %response.model,
            latency_ms = response.latency_ms,
            tokens = response.tokens_generated,
            "LLM reaction generated"
        );
        Ok(ReactionResult::success(
            request.target_entity.clone(),
            ReactionData::from(parsed),
        ))
    }
}
