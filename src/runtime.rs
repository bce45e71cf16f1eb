//! Runtime events emitted by the orchestrator for UIs and observability.
//!
//! Events are broadcast; a slow subscriber lags rather than blocking a turn.

use crate::error::{CaptureError, GenerationError, SynthesisError};
use crate::pipeline::messages::{TurnId, TurnState};
use crate::tts::ProviderKind;

/// What the conversation core is doing "right now".
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// The orchestrator changed state.
    StateChanged {
        /// Turn the change belongs to.
        turn: Option<TurnId>,
        /// New state.
        state: TurnState,
    },
    /// Partial transcript while the user speaks.
    Interim { turn: TurnId, text: String },
    /// Accepted user text (final transcript or typed submission).
    Transcript { turn: TurnId, text: String },
    /// Generated reply text.
    Reply { turn: TurnId, text: String },
    /// Apology shown when a turn fails.
    Apology { turn: TurnId, text: String },
    /// Capture failed or heard nothing usable.
    CaptureFailed { turn: TurnId, error: CaptureError },
    /// Generation failed.
    GenerationFailed {
        turn: TurnId,
        error: GenerationError,
    },
    /// Synthesis began with the configured provider.
    SynthesisStarted {
        turn: TurnId,
        provider: ProviderKind,
    },
    /// The configured provider failed; falling back.
    ProviderFallback {
        turn: TurnId,
        from: ProviderKind,
        to: ProviderKind,
        reason: SynthesisError,
    },
    /// Speech is audible.
    PlaybackStarted {
        turn: TurnId,
        provider: ProviderKind,
    },
    /// The avatar started animating.
    AnimationStarted { turn: TurnId },
    /// The avatar stopped animating.
    AnimationStopped { turn: TurnId },
    /// Speech finished.
    SynthesisEnded {
        turn: TurnId,
        provider: ProviderKind,
    },
    /// Speech failed after fallback.
    SynthesisFailed {
        turn: TurnId,
        error: SynthesisError,
    },
    /// The turn was interrupted.
    Interrupted { turn: TurnId },
    /// Conversation history was cleared.
    HistoryCleared,
}

impl RuntimeEvent {
    /// Turn this event belongs to, if any.
    pub fn turn(&self) -> Option<TurnId> {
        match self {
            Self::StateChanged { turn, .. } => *turn,
            Self::Interim { turn, .. }
            | Self::Transcript { turn, .. }
            | Self::Reply { turn, .. }
            | Self::Apology { turn, .. }
            | Self::CaptureFailed { turn, .. }
            | Self::GenerationFailed { turn, .. }
            | Self::SynthesisStarted { turn, .. }
            | Self::ProviderFallback { turn, .. }
            | Self::PlaybackStarted { turn, .. }
            | Self::AnimationStarted { turn }
            | Self::AnimationStopped { turn }
            | Self::SynthesisEnded { turn, .. }
            | Self::SynthesisFailed { turn, .. }
            | Self::Interrupted { turn } => Some(*turn),
            Self::HistoryCleared => None,
        }
    }
}
