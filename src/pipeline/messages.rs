//! Turn identity and state.

use std::fmt;
use std::time::Instant;

/// Identifier of one conversational turn. Monotonic per orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the orchestrator is in the turn cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    /// Ready for a new turn.
    #[default]
    Idle,
    /// Capturing speech.
    Listening,
    /// Waiting for the reply.
    Thinking,
    /// Speaking the reply.
    Speaking,
    /// A turn just failed; always followed by `Idle`.
    Error,
}

impl TurnState {
    /// Lowercase name for logs and status lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user-to-reply cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Turn identifier.
    pub id: TurnId,
    /// Final transcript or typed text; empty while still listening.
    pub user_text: String,
    /// Generated reply, once available.
    pub reply_text: Option<String>,
    /// When the turn began.
    pub started_at: Instant,
    /// Current state.
    pub state: TurnState,
}

impl Turn {
    /// A new turn entering `state`.
    pub fn new(id: TurnId, state: TurnState, user_text: impl Into<String>) -> Self {
        Self {
            id,
            user_text: user_text.into(),
            reply_text: None,
            started_at: Instant::now(),
            state,
        }
    }
}
