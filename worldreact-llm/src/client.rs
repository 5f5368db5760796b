//! LLM Client: unified interface for Ollama and OpenAI-compatible backends.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};
use worldreact_core::config::LlmConfig;

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse, LlmTier};

/// Provider backend for LLM inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally (recommended).
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API (also works with Together, vLLM, etc.).
    OpenAiCompatible {
        /// API root; `/v1/chat/completions` is appended.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No LLM available: all calls return error, triggering fallback synthesis.
    None,
}

/// The main LLM client that routes requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    tier1_model: String,
    tier2_model: String,
    max_retries: u32,
}

impl LlmClient {
    /// Create a new LLM client.
    #[must_use]
    pub fn new(
        provider: LlmProvider,
        tier1_model: impl Into<String>,
        tier2_model: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            provider,
            http: Client::new(),
            tier1_model: tier1_model.into(),
            tier2_model: tier2_model.into(),
            max_retries,
        }
    }

    /// Create a client with no LLM backend (all calls fail → fallback synthesis).
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), String::new(), 0)
    }

    /// Build a client from the `[llm]` config section.
    ///
    /// # Errors
    /// Returns `LlmError::ConfigError` for an unknown provider, or for the
    /// OpenAI provider without an API key.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let provider = match config.provider.as_str() {
            "ollama" => LlmProvider::Ollama { base_url },
            "openai" => {
                let api_key = config.api_key.clone().ok_or_else(|| {
                    LlmError::ConfigError("llm.api_key is required for the openai provider".into())
                })?;
                LlmProvider::OpenAiCompatible { base_url, api_key }
            }
            "none" => return Ok(Self::none()),
            other => return Err(LlmError::ConfigError(format!("unknown LLM provider {other:?}"))),
        };
        Ok(Self::new(
            provider,
            config.tier1_model.clone(),
            config.tier2_model.clone(),
            config.max_retries,
        ))
    }

    /// Generate a response from the LLM.
    ///
    /// Returns `Err` if the LLM is unavailable or all retries fail.
    /// The caller should fall back to rule-based synthesis on error.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => self.generate_ollama(base_url, request).await,
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                self.generate_openai(base_url, api_key, request).await
            }
        }
    }

    fn model_for(&self, tier: LlmTier) -> &str {
        match tier {
            LlmTier::SmallLocal => &self.tier1_model,
            LlmTier::LargeModel => &self.tier2_model,
        }
    }

    /// Generate using Ollama's API.
    async fn generate_ollama(&self, base_url: &str, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = self.model_for(request.tier);
        let url = format!("{base_url}/api/generate");
        let mut body = json!({
            "model": model,
            "prompt": format!("{}\n\n{}", request.system, request.user),
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        });
        if request.json_mode {
            body["format"] = json!("json");
        }

        let (json, latency_ms) = self
            .post_with_retries("ollama", &url, &body, None, request.timeout_ms)
            .await?;

        Ok(LlmResponse {
            text: json["response"].as_str().unwrap_or("").to_string(),
            tokens_generated: u32::try_from(json["eval_count"].as_u64().unwrap_or(0)).unwrap_or(u32::MAX),
            latency_ms,
            model: model.to_string(),
        })
    }

    /// Generate using an OpenAI-compatible API.
    async fn generate_openai(
        &self,
        base_url: &str,
        api_key: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse, LlmError> {
        let model = self.model_for(request.tier);
        let url = format!("{base_url}/v1/chat/completions");
        let mut body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let (json, latency_ms) = self
            .post_with_retries("openai", &url, &body, Some(api_key), request.timeout_ms)
            .await?;

        Ok(LlmResponse {
            text: json["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or("")
                .to_string(),
            tokens_generated: u32::try_from(json["usage"]["completion_tokens"].as_u64().unwrap_or(0))
                .unwrap_or(u32::MAX),
            latency_ms,
            model: model.to_string(),
        })
    }

    /// POST `body`, retrying failed attempts up to `max_retries` times.
    ///
    /// Returns the decoded JSON body and the latency of the successful attempt.
    async fn post_with_retries(
        &self,
        backend: &'static str,
        url: &str,
        body: &Value,
        api_key: Option<&str>,
        timeout_ms: u64,
    ) -> Result<(Value, u64), LlmError> {
        let mut last_error = String::new();
        let mut every_attempt_timed_out = true;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(backend, attempt = attempt + 1, of = self.max_retries + 1, "retrying LLM call");
            }

            let mut builder = self
                .http
                .post(url)
                .json(body)
                .timeout(Duration::from_millis(timeout_ms));
            if let Some(key) = api_key {
                builder = builder.bearer_auth(key);
            }

            let start = Instant::now();
            match builder.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                    return Ok((json, latency_ms));
                }
                Ok(resp) => {
                    every_attempt_timed_out = false;
                    let status = resp.status();
                    last_error = format!("HTTP {status}: {}", resp.text().await.unwrap_or_default());
                    warn!(backend, error = %last_error, "LLM backend returned error");
                }
                Err(e) => {
                    if e.is_timeout() {
                        warn!(backend, timeout_ms, "LLM request timed out");
                    } else {
                        every_attempt_timed_out = false;
                        warn!(backend, error = %e, "LLM request failed");
                    }
                    last_error = e.to_string();
                }
            }
        }

        if every_attempt_timed_out {
            return Err(LlmError::Timeout(timeout_ms));
        }
        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Parse a raw LLM response text as structured JSON.
    ///
    /// Models often wrap JSON in prose or code fences; the outermost
    /// `{ ... }` span is parsed when one exists.
    ///
    /// # Errors
    /// Returns `LlmError::ParseError` if the text is not valid JSON for `T`.
    pub fn parse_structured<T: serde::de::DeserializeOwned>(
        &self,
        response: &LlmResponse,
    ) -> Result<T, LlmError> {
        serde_json::from_str(json_object_span(&response.text)).map_err(|e| {
            LlmError::ParseError(format!("JSON parse error: {e} (raw text: {:?})", response.text))
        })
    }

    /// Check if the LLM client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }
}

fn json_object_span(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReactionResponse;

    fn response(text: &str) -> LlmResponse {
        LlmResponse {
            text: text.to_string(),
            tokens_generated: 0,
            latency_ms: 0,
            model: "test".into(),
        }
    }

    #[tokio::test]
    async fn none_provider_is_unavailable() {
        let client = LlmClient::none();
        assert!(!client.is_available());
        let err = client
            .generate(&LlmRequest::tier1("system", "user"))
            .await
            .expect_err("no backend");
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[test]
    fn parses_fenced_json() {
        let client = LlmClient::none();
        let text = "Sure!\n```json\n{\"perception\": \"wary\", \"narration\": \"The guard squints.\"}\n```";
        let parsed: ReactionResponse = client.parse_structured(&response(text)).expect("parse");
        assert_eq!(parsed.perception, "wary");
        assert_eq!(parsed.narration, "The guard squints.");
        assert!(parsed.attitude_shift.is_none());
    }

    #[test]
    fn non_json_is_a_parse_error() {
        let client = LlmClient::none();
        let err = client
            .parse_structured::<ReactionResponse>(&response("The guard squints."))
            .expect_err("not json");
        assert!(matches!(err, LlmError::ParseError(_)));
    }

    #[test]
    fn openai_config_requires_api_key() {
        let config = LlmConfig {
            provider: "openai".into(),
            ..LlmConfig::default()
        };
        assert!(matches!(LlmClient::from_config(&config), Err(LlmError::ConfigError(_))));

        let config = LlmConfig {
            provider: "openai".into(),
            api_key: Some("sk-test".into()),
            ..LlmConfig::default()
        };
        assert!(LlmClient::from_config(&config).expect("client").is_available());
    }

    #[test]
    fn none_config_builds_unavailable_client() {
        let config = LlmConfig {
            provider: "none".into(),
            ..LlmConfig::default()
        };
        assert!(!LlmClient::from_config(&config).expect("client").is_available());
    }
}
