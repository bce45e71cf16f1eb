//! Text-generation adapters.
//!
//! The orchestrator only sees [`TextGenerator`]: given the prior conversation
//! and the new user text, produce one reply or fail explicitly. Two HTTP
//! backends ship with the crate, selected by [`LlmConfig::provider`].

mod gemini;
mod openai;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::GenerationError;
use crate::history::HistoryMessage;
use async_trait::async_trait;
use std::sync::Arc;

/// Persona prompt used when the config does not override it.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Nanna, a loving Telugu father figure teaching your child \"Chinna\".\n\
\n\
PERSONALITY:\n\
- Warm, patient Telugu man in his fifties\n\
- Mix Telugu and English naturally (Tenglish)\n\
- Call the user \"Chinna\", \"ra Chinna\", \"Chinna babu\"\n\
- Use expressions like \"Vinara...\", \"Baaga cheppav!\", \"Ardam ayyinda?\"\n\
\n\
TEACHING STYLE:\n\
- Encouraging but expects effort\n\
- Use simple everyday analogies and break complex topics into pieces\n\
- Topics: AI, finance (ISIN, CUSIP, trading), insurance, math\n\
\n\
RESPONSE FORMAT:\n\
- Conversational, 2-4 sentences\n\
- Include Telugu words or phrases naturally\n\
- End with a question or encouragement when teaching";

/// Produces a reply for one turn.
///
/// Implementations must fail explicitly rather than return empty text on
/// error. An empty successful reply is valid and is spoken as silence.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a reply to `user_text` given the prior conversation, oldest first.
    async fn generate(
        &self,
        history: &[HistoryMessage],
        user_text: &str,
    ) -> Result<String, GenerationError>;
}

/// Build the generator selected by `config.provider`.
pub fn generator_from_config(config: &LlmConfig) -> Arc<dyn TextGenerator> {
    match config.provider {
        LlmProvider::Gemini => Arc::new(GeminiGenerator::new(config.clone())),
        LlmProvider::OpenAi => Arc::new(OpenAiGenerator::new(config.clone())),
    }
}

/// Pull `error.message` out of an error body, falling back to the status line.
pub(crate) fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}
