//! Error types for the nanna conversation core.

use crate::tts::ProviderKind;

/// Speech-capture failures. All of them end the turn; none are retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The recogniser heard nothing before giving up.
    #[error("no speech detected")]
    NoSpeech,

    /// No usable microphone.
    #[error("audio capture device unavailable")]
    DeviceUnavailable,

    /// Microphone permission was refused.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// The recogniser backend could not be reached.
    #[error("network error during capture")]
    Network,

    /// Capture was stopped before a result arrived.
    #[error("capture aborted")]
    Aborted,

    /// The configured recognition language is not supported.
    #[error("language not supported: {0}")]
    LanguageNotSupported(String),

    /// Capture is not available on this host.
    #[error("speech capture not supported")]
    Unsupported,

    /// No final transcript arrived within the capture timeout.
    #[error("capture timed out after {secs}s")]
    Timeout {
        /// Configured timeout.
        secs: u64,
    },

    /// Any other recogniser failure.
    #[error("capture error: {0}")]
    Other(String),
}

impl CaptureError {
    /// Short message suitable for the status line.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoSpeech => "No speech detected. Try again.".to_owned(),
            Self::DeviceUnavailable => "Microphone not found.".to_owned(),
            Self::PermissionDenied => "Microphone permission denied.".to_owned(),
            Self::Network => "Network error. Check connection.".to_owned(),
            Self::Aborted => "Listening stopped.".to_owned(),
            Self::LanguageNotSupported(_) => "Language not supported.".to_owned(),
            Self::Unsupported => "Speech recognition not supported".to_owned(),
            Self::Timeout { .. } => "Listening timed out. Try again.".to_owned(),
            Self::Other(reason) => format!("Error: {reason}"),
        }
    }
}

/// Text-generation failures. Terminal for the turn, surfaced as an apology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// No API key configured for the selected model provider.
    #[error("{provider} API key not set")]
    MissingCredentials {
        /// Model provider name.
        provider: String,
    },

    /// The provider answered with an error status.
    #[error("{provider} API error: {message}")]
    Api {
        /// Model provider name.
        provider: String,
        /// Provider-supplied message, or the HTTP status when none was given.
        message: String,
    },

    /// The response parsed but carried no usable text.
    #[error("malformed response from {provider}: {detail}")]
    MalformedResponse {
        /// Model provider name.
        provider: String,
        /// What was missing or wrong.
        detail: String,
    },

    /// Transport failure (DNS, connect, TLS, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The generation call did not complete in time.
    #[error("generation timed out after {secs}s")]
    Timeout {
        /// Configured timeout.
        secs: u64,
    },
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Speech-synthesis failures for one provider attempt, or for the whole chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// The provider needs credentials or identifiers that are not configured.
    #[error("{provider}: {what} not set")]
    MissingCredentials {
        /// Provider that was attempted.
        provider: ProviderKind,
        /// Which setting is missing.
        what: &'static str,
    },

    /// The provider is not registered with the chain.
    #[error("{0}: provider not available")]
    Unavailable(ProviderKind),

    /// The provider answered with an error status.
    #[error("{provider} API error: {message}")]
    Api {
        /// Provider that was attempted.
        provider: ProviderKind,
        /// Provider-supplied message, or the HTTP status when none was given.
        message: String,
    },

    /// The response carried neither audio nor a job handle.
    #[error("{provider}: malformed response: {detail}")]
    MalformedResponse {
        /// Provider that was attempted.
        provider: ProviderKind,
        /// What was missing or wrong.
        detail: String,
    },

    /// Transport failure.
    #[error("{provider}: network error: {message}")]
    Network {
        /// Provider that was attempted.
        provider: ProviderKind,
        /// Transport error text.
        message: String,
    },

    /// A pending job did not become ready within the polling bound.
    #[error("{provider}: audio generation timed out after {attempts} polls")]
    PollTimeout {
        /// Provider that was polled.
        provider: ProviderKind,
        /// Number of poll attempts made.
        attempts: u32,
    },

    /// The provider reported that the job failed.
    #[error("{provider}: job failed: {reason}")]
    JobFailed {
        /// Provider that was polled.
        provider: ProviderKind,
        /// Provider-supplied reason.
        reason: String,
    },

    /// The provider does not support polling but returned a pending job.
    #[error("{0}: polling not supported")]
    PollUnsupported(ProviderKind),

    /// The playback primitive failed.
    #[error("playback error: {0}")]
    Playback(String),

    /// The chain was cancelled by an interrupt.
    #[error("synthesis cancelled")]
    Cancelled,
}

impl SynthesisError {
    /// Whether this failure may be retried once against the default provider.
    pub fn is_fallback_eligible(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// A named expression's visual asset could not be used. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnimationAssetError {
    /// The asset file does not exist.
    #[error("expression asset missing for {expression}: {path}")]
    Missing {
        /// Expression name.
        expression: &'static str,
        /// Path that was checked.
        path: String,
    },

    /// The assets directory could not be read.
    #[error("expression assets directory unreadable: {0}")]
    Directory(String),
}

/// Top-level error type for the conversation core.
#[derive(Debug, thiserror::Error)]
pub enum NannaError {
    /// Speech capture error.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Text generation error.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Speech synthesis error.
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// Expression asset error.
    #[error(transparent)]
    AnimationAsset(#[from] AnimationAssetError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NannaError>;
