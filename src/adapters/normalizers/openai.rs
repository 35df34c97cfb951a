//! OpenAI chat-completion thought normalizer.
//!
//! Asks a chat model to condense the agent's reasoning into a short
//! canonical intent label. Works with any OpenAI-compatible
//! `/chat/completions` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::errors::{GuardError, GuardResult};
use crate::domain::ports::ThoughtNormalizer;
use crate::services::thought_cache::canonical_label;

const SYSTEM_PROMPT: &str = "You label the goal behind an AI agent's reasoning. \
Reply with a canonical intent of at most five lowercase words, no punctuation. \
Thoughts pursuing the same goal with different wording or identifiers must get the same label. \
Example: 'search XYZ-9999' and 'try XYZ 9999' both become 'find product by id'.";

/// Configuration for the OpenAI thought normalizer.
#[derive(Debug, Clone)]
pub struct OpenAiNormalizerConfig {
    /// API key. Falls back to `OPENAI_API_KEY` env var.
    pub api_key: Option<String>,
    /// Base URL for the API. Default: `https://api.openai.com/v1`.
    pub base_url: String,
    /// Chat model. Default: `gpt-4o-mini`.
    pub model: String,
    /// Words kept from the returned label. Default: 5.
    pub max_words: usize,
    /// Request timeout in seconds. Default: 30.
    pub timeout_secs: u64,
}

impl Default for OpenAiNormalizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_words: 5,
            timeout_secs: 30,
        }
    }
}

/// Thought normalizer backed by a chat-completion model.
pub struct OpenAiThoughtNormalizer {
    config: OpenAiNormalizerConfig,
    client: Arc<reqwest::Client>,
}

impl OpenAiThoughtNormalizer {
    pub fn new(config: OpenAiNormalizerConfig) -> GuardResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GuardError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            client: Arc::new(client),
        })
    }

    fn api_key(&self) -> GuardResult<String> {
        self.config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                GuardError::NormalizationUnavailable(
                    "OpenAI API key not set. Set OPENAI_API_KEY env var or configure api_key."
                        .to_string(),
                )
            })
    }
}

#[async_trait]
impl ThoughtNormalizer for OpenAiThoughtNormalizer {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn normalize(&self, text: &str) -> GuardResult<String> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let request_body = ChatRequest {
            model: self.config.model.clone(),
            temperature: 0.0,
            max_tokens: 16,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                GuardError::NormalizationUnavailable(format!("Chat API request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(GuardError::NormalizationUnavailable(format!(
                "Chat API returned {status}: {body}"
            )));
        }

        let result: ChatResponse = response.json().await.map_err(|e| {
            GuardError::NormalizationUnavailable(format!("Failed to parse chat response: {e}"))
        })?;
        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        canonical_label(&content, self.config.max_words).ok_or_else(|| {
            GuardError::NormalizationUnavailable("Chat API returned an empty label".to_string())
        })
    }
}

// -- OpenAI API request/response types --

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OpenAiNormalizerConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_words, 5);
    }

    #[test]
    fn test_missing_key_is_degradable() {
        temp_env::with_var_unset("OPENAI_API_KEY", || {
            let normalizer = OpenAiThoughtNormalizer::new(OpenAiNormalizerConfig::default()).unwrap();
            let err = normalizer.api_key().unwrap_err();
            assert!(err.is_degradable());
        });
    }
}
