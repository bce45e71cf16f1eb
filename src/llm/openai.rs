//! OpenAI-compatible chat completions backend.

use super::{TextGenerator, api_error_message};
use crate::config::LlmConfig;
use crate::error::GenerationError;
use crate::history::{HistoryMessage, Role};
use async_trait::async_trait;
use tracing::info;

const PROVIDER: &str = "OpenAI";

/// Generator for any server exposing `/chat/completions`.
pub struct OpenAiGenerator {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    /// Create a generator from the LLM config (reads the `openai` section).
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn build_body(&self, history: &[HistoryMessage], user_text: &str) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": self.config.system_prompt,
        })];
        for m in history {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(serde_json::json!({ "role": role, "content": m.text }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": user_text }));

        serde_json::json!({
            "model": self.config.openai.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        history: &[HistoryMessage],
        user_text: &str,
    ) -> Result<String, GenerationError> {
        let openai = &self.config.openai;
        if openai.api_key.is_empty() {
            return Err(GenerationError::MissingCredentials {
                provider: PROVIDER.into(),
            });
        }

        let base = openai.base_url.trim_end_matches('/');
        let url = format!("{base}/chat/completions");
        info!(model = openai.model.as_str(), "requesting chat completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&openai.api_key)
            .json(&self.build_body(history, user_text))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GenerationError::Api {
                provider: PROVIDER.into(),
                message: api_error_message(status, &body),
            });
        }

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| GenerationError::MalformedResponse {
                provider: PROVIDER.into(),
                detail: e.to_string(),
            })?;
        value
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|c| c.trim().to_owned())
            .ok_or_else(|| GenerationError::MalformedResponse {
                provider: PROVIDER.into(),
                detail: "no choices[0].message.content".into(),
            })
    }
}
