//! Host system voice: the always-available default provider.

use super::{ProviderKind, SpeechProvider, SynthesisOutcome};
use crate::audio::AudioHandle;
use crate::config::TtsConfig;
use crate::error::SynthesisError;
use async_trait::async_trait;

/// Hands the text to the playback primitive's built-in voice.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVoiceProvider;

#[async_trait]
impl SpeechProvider for SystemVoiceProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::System
    }

    async fn synthesize(
        &self,
        text: &str,
        config: &TtsConfig,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        Ok(SynthesisOutcome::Audio(AudioHandle::Utterance {
            text: text.to_owned(),
            voice: config.system.clone(),
        }))
    }
}
