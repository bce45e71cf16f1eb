//! Playback primitive contract.
//!
//! Decoding and device output live behind [`Playback`]. The synthesis chain
//! hands it an [`AudioHandle`] and forwards the resulting [`PlaybackEvent`]
//! stream as its own.

pub mod playback;

pub use playback::SimulatedPlayback;

use crate::config::SystemVoiceConfig;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Audio ready to be played.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioHandle {
    /// Text to be spoken by the host's built-in voice.
    Utterance {
        /// Text to speak.
        text: String,
        /// Voice parameters.
        voice: SystemVoiceConfig,
    },
    /// Encoded audio returned by a provider.
    Encoded {
        /// Raw container bytes.
        bytes: Bytes,
        /// MIME type, e.g. `audio/mpeg`.
        mime: String,
    },
    /// Audio hosted at a URL.
    Url(String),
}

/// Progress of one playback.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Audio is audible.
    Started,
    /// Output amplitude in `0.0..=1.0`, sampled at a fixed cadence.
    Level(f32),
    /// Playback finished normally.
    Ended,
    /// Playback failed.
    Failed(String),
}

/// Plays one [`AudioHandle`] at a time.
pub trait Playback: Send + Sync {
    /// Start playing `audio`. The stream ends after `Ended` or `Failed`, or
    /// silently after [`cancel`](Playback::cancel).
    fn play(&self, audio: AudioHandle) -> mpsc::Receiver<PlaybackEvent>;

    /// Stop whatever is playing.
    fn cancel(&self);
}
