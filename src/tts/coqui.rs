//! Self-hosted Coqui XTTS server.

use super::{ProviderKind, SpeechProvider, SynthesisOutcome, network_error};
use crate::audio::AudioHandle;
use crate::config::TtsConfig;
use crate::error::SynthesisError;
use async_trait::async_trait;
use tracing::info;

const KIND: ProviderKind = ProviderKind::Coqui;

/// Coqui `/api/tts` client.
#[derive(Debug, Clone, Default)]
pub struct CoquiProvider {
    client: reqwest::Client,
}

impl CoquiProvider {
    /// Create a provider with its own HTTP client.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeechProvider for CoquiProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn synthesize(
        &self,
        text: &str,
        config: &TtsConfig,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        let settings = &config.coqui;
        let base = settings.server_url.trim_end_matches('/');
        info!(server = base, "requesting Coqui audio");

        let response = self
            .client
            .post(format!("{base}/api/tts"))
            .json(&serde_json::json!({
                "text": text,
                "voice": settings.speaker_id,
                "language": settings.language,
            }))
            .send()
            .await
            .map_err(network_error(KIND))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SynthesisError::Api {
                provider: KIND,
                message: format!("Coqui TTS server error (HTTP {status})"),
            });
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/wav")
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
