//! Text-to-speech providers and the fallback chain that drives them.
//!
//! Every backend implements [`SpeechProvider`]: synthesis yields either audio
//! immediately or a job handle that must be polled. [`ProviderChain`] picks
//! the active provider, falls back once to the always-available system voice,
//! and plays the result through the injected playback primitive.

pub mod chain;
mod coqui;
mod elevenlabs;
mod resemble;
mod system;

pub use chain::{PollPolicy, ProviderChain, ProviderChainBuilder, SynthesisEvent};
pub use coqui::CoquiProvider;
pub use elevenlabs::ElevenLabsProvider;
pub use resemble::ResembleProvider;
pub use system::SystemVoiceProvider;

use crate::audio::AudioHandle;
use crate::config::TtsConfig;
use crate::error::SynthesisError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Known synthesis backends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Host's built-in voice. Needs no credentials; the terminal fallback.
    #[default]
    #[serde(alias = "browser")]
    System,
    /// ElevenLabs cloned voice.
    ElevenLabs,
    /// Resemble cloned voice (asynchronous clips).
    Resemble,
    /// Self-hosted Coqui XTTS server.
    Coqui,
}

/// The provider every failed attempt falls back to.
pub const DEFAULT_PROVIDER: ProviderKind = ProviderKind::System;

impl ProviderKind {
    /// All known providers.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::System,
        ProviderKind::ElevenLabs,
        ProviderKind::Resemble,
        ProviderKind::Coqui,
    ];

    /// Config identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::ElevenLabs => "elevenlabs",
            Self::Resemble => "resemble",
            Self::Coqui => "coqui",
        }
    }

    /// Whether this is the terminal fallback provider.
    pub fn is_default(self) -> bool {
        self == DEFAULT_PROVIDER
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" | "browser" => Ok(Self::System),
            "elevenlabs" => Ok(Self::ElevenLabs),
            "resemble" => Ok(Self::Resemble),
            "coqui" => Ok(Self::Coqui),
            other => Err(format!("unknown TTS provider: {other}")),
        }
    }
}

/// Handle for a synthesis job that is still being rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Provider that owns the job.
    pub provider: ProviderKind,
    /// Provider-specific job identifier.
    pub id: String,
}

/// Result of a synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    /// Audio is available now.
    Audio(AudioHandle),
    /// Audio will be available later; poll the job.
    Pending(JobHandle),
}

/// Result of polling a pending job.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// Still rendering.
    Pending,
    /// Audio is ready.
    Ready(AudioHandle),
    /// The provider gave up on the job.
    Failed(String),
}

/// A speech-synthesis backend.
///
/// Providers read their settings from the [`TtsConfig`] snapshot passed on
/// each call, so configuration edits apply to the next request.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> ProviderKind;

    /// Convert `text` into audio or a pending job.
    async fn synthesize(
        &self,
        text: &str,
        config: &TtsConfig,
    ) -> Result<SynthesisOutcome, SynthesisError>;

    /// Check on a pending job.
    async fn poll_status(
        &self,
        job: &JobHandle,
        config: &TtsConfig,
    ) -> Result<PollStatus, SynthesisError> {
        let _ = (job, config);
        Err(SynthesisError::PollUnsupported(self.kind()))
    }
}

/// Map a transport error to a provider failure.
pub(crate) fn network_error(provider: ProviderKind) -> impl Fn(reqwest::Error) -> SynthesisError {
    move |e| SynthesisError::Network {
        provider,
        message: e.to_string(),
    }
}

/// Pull a human-readable message out of a provider error body.
pub(crate) fn error_detail(status: reqwest::StatusCode, body: &str) -> String {
    let value = serde_json::from_str::<serde_json::Value>(body).ok();
    value
        .as_ref()
        .and_then(|v| {
            v.pointer("/detail/message")
                .or_else(|| v.pointer("/message"))
                .or_else(|| v.pointer("/error"))
                .and_then(|m| m.as_str())
        })
        .map(str::to_owned)
        .unwrap_or_else(|| format!("HTTP {status}"))
}
