//! ElevenLabs cloned-voice synthesis (immediate audio).

use super::{ProviderKind, SpeechProvider, SynthesisOutcome, error_detail, network_error};
use crate::audio::AudioHandle;
use crate::config::TtsConfig;
use crate::error::SynthesisError;
use async_trait::async_trait;
use tracing::info;

const KIND: ProviderKind = ProviderKind::ElevenLabs;

/// ElevenLabs text-to-speech client.
#[derive(Debug, Clone, Default)]
pub struct ElevenLabsProvider {
    client: reqwest::Client,
}

impl ElevenLabsProvider {
    /// Create a provider with its own HTTP client.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn synthesize(
        &self,
        text: &str,
        config: &TtsConfig,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        let settings = &config.elevenlabs;
        if settings.api_key.is_empty() {
            return Err(SynthesisError::MissingCredentials {
                provider: KIND,
                what: "API key",
            });
        }
        if settings.voice_id.is_empty() {
            return Err(SynthesisError::MissingCredentials {
                provider: KIND,
                what: "voice ID",
            });
        }

        let base = settings.base_url.trim_end_matches('/');
        let url = format!("{base}/v1/text-to-speech/{}", settings.voice_id);
        info!(voice = settings.voice_id.as_str(), "requesting ElevenLabs audio");

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &settings.api_key)
            .header("accept", "audio/mpeg")
            .json(&serde_json::json!({
                "text": text,
                "model_id": settings.model_id,
                "voice_settings": {
                    "stability": settings.stability,
                    "similarity_boost": settings.similarity_boost,
                },
            }))
            .send()
            .await
            .map_err(network_error(KIND))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Api {
                provider: KIND,
                message: error_detail(status, &body),
            });
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_owned();
        let bytes = response.bytes().await.map_err(network_error(KIND))?;
        if bytes.is_empty() {
            return Err(SynthesisError::MalformedResponse {
                provider: KIND,
                detail: "empty audio body".into(),
            });
        }

        Ok(SynthesisOutcome::Audio(AudioHandle::Encoded { bytes, mime }))
    }
}
