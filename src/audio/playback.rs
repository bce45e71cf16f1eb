//! Paced playback without an output device.
//!
//! [`SimulatedPlayback`] takes as long as the audio would take to speak and
//! reports a deterministic amplitude envelope derived from the content. It
//! backs the terminal binary and headless hosts where a UI layer does the
//! real audio output.

use super::{AudioHandle, Playback, PlaybackEvent};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Assumed bitrate for encoded audio when estimating its duration (128 kbit/s).
const ENCODED_BYTES_PER_SEC: u64 = 16_000;

/// Duration assumed for audio only known by URL.
const URL_DURATION: Duration = Duration::from_secs(2);

const EVENT_CHANNEL_SIZE: usize = 64;

/// Playback that paces events by estimated speaking time.
#[derive(Debug)]
pub struct SimulatedPlayback {
    ms_per_char: u64,
    level_interval: Duration,
    current: Mutex<Option<CancellationToken>>,
}

impl SimulatedPlayback {
    /// Create a playback that speaks `ms_per_char` per character and reports a
    /// level every `level_interval`.
    pub fn new(ms_per_char: u64, level_interval: Duration) -> Self {
        Self {
            ms_per_char,
            level_interval: level_interval.max(Duration::from_millis(1)),
            current: Mutex::new(None),
        }
    }

    /// Estimated playing time for `audio`.
    pub fn duration_of(&self, audio: &AudioHandle) -> Duration {
        match audio {
            AudioHandle::Utterance { text, voice } => {
                let chars = text.chars().count() as f64;
                let rate = f64::from(voice.rate).max(0.1);
                Duration::from_millis((chars * self.ms_per_char as f64 / rate) as u64)
            }
            AudioHandle::Encoded { bytes, .. } => {
                Duration::from_millis(bytes.len() as u64 * 1000 / ENCODED_BYTES_PER_SEC)
            }
            AudioHandle::Url(_) => URL_DURATION,
        }
    }

    fn replace_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut guard = match self.current.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = guard.replace(token.clone()) {
            previous.cancel();
        }
        token
    }
}

impl Default for SimulatedPlayback {
    fn default() -> Self {
        Self::new(90, Duration::from_millis(50))
    }
}

impl Playback for SimulatedPlayback {
    fn play(&self, audio: AudioHandle) -> mpsc::Receiver<PlaybackEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let cancel = self.replace_token();
        let total = self.duration_of(&audio);
        let envelope = envelope_for(&audio);
        let interval = self.level_interval;

        tokio::spawn(async move {
            if tx.send(PlaybackEvent::Started).await.is_err() {
                return;
            }
            debug!(duration_ms = total.as_millis() as u64, "simulated playback started");

            let start = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("simulated playback cancelled");
                        return;
                    }
                    _ = ticker.tick() => {
                        let elapsed = start.elapsed();
                        if elapsed >= total {
                            break;
                        }
                        let level = level_at(&envelope, elapsed, total);
                        if tx.send(PlaybackEvent::Level(level)).await.is_err() {
                            return;
                        }
                    }
                }
            }
            let _ = tx.send(PlaybackEvent::Ended).await;
        });

        rx
    }

    fn cancel(&self) {
        let guard = match self.current.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(ref token) = *guard {
            token.cancel();
        }
    }
}

/// Per-segment loudness used to synthesise level samples.
fn envelope_for(audio: &AudioHandle) -> Vec<f32> {
    match audio {
        AudioHandle::Utterance { text, voice } => text
            .chars()
            .map(|c| {
                let base = match c.to_ascii_lowercase() {
                    'a' | 'o' => 0.6,
                    'e' | 'i' | 'u' => 0.4,
                    c if c.is_whitespace() => 0.0,
                    c if c.is_alphabetic() => 0.2,
                    _ => 0.05,
                };
                base * voice.volume.clamp(0.0, 1.0)
            })
            .collect(),
        AudioHandle::Encoded { bytes, .. } => bytes
            .iter()
            .step_by(512)
            .map(|b| f32::from(*b) / 255.0)
            .collect(),
        AudioHandle::Url(_) => vec![0.3, 0.5, 0.2, 0.6],
    }
}

fn level_at(envelope: &[f32], elapsed: Duration, total: Duration) -> f32 {
    if envelope.is_empty() || total.is_zero() {
        return 0.0;
    }
    let pos = elapsed.as_secs_f64() / total.as_secs_f64();
    let idx = ((pos * envelope.len() as f64) as usize).min(envelope.len() - 1);
    envelope[idx]
}
