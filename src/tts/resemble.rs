//! Resemble cloned-voice synthesis.
//!
//! Clip creation may return the audio URL straight away or only a clip UUID,
//! in which case the clip is polled until `audio_src` appears.

use super::{
    JobHandle, PollStatus, ProviderKind, SpeechProvider, SynthesisOutcome, error_detail,
    network_error,
};
use crate::audio::AudioHandle;
use crate::config::{ResembleConfig, TtsConfig};
use crate::error::SynthesisError;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

const KIND: ProviderKind = ProviderKind::Resemble;

#[derive(Debug, Deserialize)]
struct ClipEnvelope {
    item: Option<ClipItem>,
}

#[derive(Debug, Deserialize)]
struct ClipItem {
    uuid: Option<String>,
    audio_src: Option<String>,
    status: Option<String>,
}

/// Resemble clips client.
#[derive(Debug, Clone, Default)]
pub struct ResembleProvider {
    client: reqwest::Client,
}

impl ResembleProvider {
    /// Create a provider with its own HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_settings(settings: &ResembleConfig) -> Result<(), SynthesisError> {
        if settings.api_key.is_empty() {
            return Err(SynthesisError::MissingCredentials {
                provider: KIND,
                what: "API key",
            });
        }
        if settings.project_uuid.is_empty() || settings.voice_uuid.is_empty() {
            return Err(SynthesisError::MissingCredentials {
                provider: KIND,
                what: "voice/project UUID",
            });
        }
        Ok(())
    }

    fn clips_url(settings: &ResembleConfig) -> String {
        let base = settings.base_url.trim_end_matches('/');
        format!("{base}/api/v2/projects/{}/clips", settings.project_uuid)
    }

    async fn read_clip(response: reqwest::Response) -> Result<ClipItem, SynthesisError> {
        let status = response.status();
        let body = response.text().await.map_err(network_error(KIND))?;
        if !status.is_success() {
            return Err(SynthesisError::Api {
                provider: KIND,
                message: error_detail(status, &body),
            });
        }
        let envelope: ClipEnvelope =
            serde_json::from_str(&body).map_err(|e| SynthesisError::MalformedResponse {
                provider: KIND,
                detail: e.to_string(),
            })?;
        envelope
            .item
            .ok_or_else(|| SynthesisError::MalformedResponse {
                provider: KIND,
                detail: "missing item".into(),
            })
    }
}

#[async_trait]
impl SpeechProvider for ResembleProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn synthesize(
        &self,
        text: &str,
        config: &TtsConfig,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        let settings = &config.resemble;
        Self::check_settings(settings)?;
        info!("creating Resemble clip");

        let response = self
            .client
            .post(Self::clips_url(settings))
            .header("authorization", format!("Token token={}", settings.api_key))
            .json(&serde_json::json!({
                "body": text,
                "voice_uuid": settings.voice_uuid,
                "is_public": false,
                "is_archived": false,
            }))
            .send()
            .await
            .map_err(network_error(KIND))?;
        let item = Self::read_clip(response).await?;

        match (item.audio_src, item.uuid) {
            (Some(src), _) => Ok(SynthesisOutcome::Audio(AudioHandle::Url(src))),
            (None, Some(uuid)) => {
                debug!(clip = uuid.as_str(), "Resemble clip pending");
                Ok(SynthesisOutcome::Pending(JobHandle {
                    provider: KIND,
                    id: uuid,
                }))
            }
            (None, None) => Err(SynthesisError::MalformedResponse {
                provider: KIND,
                detail: "no audio returned".into(),
            }),
        }
    }

    async fn poll_status(
        &self,
        job: &JobHandle,
        config: &TtsConfig,
    ) -> Result<PollStatus, SynthesisError> {
        let settings = &config.resemble;
        Self::check_settings(settings)?;

        let url = format!("{}/{}", Self::clips_url(settings), job.id);
        let response = self
            .client
            .get(url)
            .header("authorization", format!("Token token={}", settings.api_key))
            .send()
            .await
            .map_err(network_error(KIND))?;
        let item = Self::read_clip(response).await?;

        if let Some(src) = item.audio_src {
            return Ok(PollStatus::Ready(AudioHandle::Url(src)));
        }
        match item.status.as_deref() {
            Some("failed") | Some("error") => Ok(PollStatus::Failed(format!(
                "clip {} failed to render",
                job.id
            ))),
            _ => Ok(PollStatus::Pending),
        }
    }
}
