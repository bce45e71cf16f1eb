//! Google Gemini `generateContent` backend.

use super::{TextGenerator, api_error_message};
use crate::config::LlmConfig;
use crate::error::GenerationError;
use crate::history::{HistoryMessage, Role};
use async_trait::async_trait;
use tracing::{debug, info};

const PROVIDER: &str = "Gemini";

/// Gemini text generator.
pub struct GeminiGenerator {
    config: LlmConfig,
    client: reqwest::Client,
}

impl GeminiGenerator {
    /// Create a generator from the LLM config (reads the `gemini` section).
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn build_body(&self, history: &[HistoryMessage], user_text: &str) -> serde_json::Value {
        let mut contents: Vec<serde_json::Value> = history
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                serde_json::json!({ "role": role, "parts": [{ "text": m.text }] })
            })
            .collect();
        contents.push(serde_json::json!({
            "role": "user",
            "parts": [{ "text": user_text }],
        }));

        serde_json::json!({
            "systemInstruction": { "parts": [{ "text": self.config.system_prompt }] },
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": self.config.max_tokens,
                "temperature": self.config.temperature,
            },
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(
        &self,
        history: &[HistoryMessage],
        user_text: &str,
    ) -> Result<String, GenerationError> {
        let gemini = &self.config.gemini;
        if gemini.api_key.is_empty() {
            return Err(GenerationError::MissingCredentials {
                provider: PROVIDER.into(),
            });
        }

        let base = gemini.base_url.trim_end_matches('/');
        let url = format!(
            "{base}/v1beta/models/{}:generateContent?key={}",
            gemini.model, gemini.api_key
        );
        info!(model = gemini.model.as_str(), "requesting Gemini reply");

        let response = self
            .client
            .post(&url)
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
        let text = value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| GenerationError::MalformedResponse {
                provider: PROVIDER.into(),
                detail: "no candidate text".into(),
            })?;

        debug!(chars = text.len(), "Gemini reply received");
        Ok(text.trim().to_owned())
    }
}
