//! Frame strategies: where the next expression comes from.

use crate::sentiment::Emotion;
use crate::viseme::{Expression, TimedFrame, amplitude_to_expression};
use async_trait::async_trait;
use rand::Rng;
use rand::rngs::StdRng;
use std::time::Duration;
use tokio::sync::mpsc;

/// Yields expressions over time while speech plays.
#[async_trait]
pub trait FrameStrategy: Send {
    /// Name for logs.
    fn name(&self) -> &'static str;

    /// Wait for and return the next expression; `None` when exhausted.
    async fn next_frame(&mut self) -> Option<Expression>;
}

/// Steps through a precomputed text plan on a timer.
///
/// With the configured probability a frame is replaced by the reply's
/// emotion expression. Replacement never changes frame timing.
pub struct TextTimedStrategy {
    frames: Vec<TimedFrame>,
    index: usize,
    hold: Option<Duration>,
    emotion: Option<Expression>,
    override_probability: f64,
    rng: StdRng,
}

impl TextTimedStrategy {
    /// Strategy over `frames`, overriding with `emotion`'s expression.
    pub fn new(
        frames: Vec<TimedFrame>,
        emotion: Emotion,
        override_probability: f64,
        rng: StdRng,
    ) -> Self {
        Self {
            frames,
            index: 0,
            hold: None,
            emotion: emotion.expression(),
            override_probability: override_probability.clamp(0.0, 1.0),
            rng,
        }
    }
}

#[async_trait]
impl FrameStrategy for TextTimedStrategy {
    fn name(&self) -> &'static str {
        "text"
    }

    async fn next_frame(&mut self) -> Option<Expression> {
        if let Some(hold) = self.hold.take() {
            tokio::time::sleep(hold).await;
        }
        let frame = *self.frames.get(self.index)?;
        self.index += 1;
        self.hold = Some(frame.duration);

        match self.emotion {
            Some(emotion) if self.rng.gen_bool(self.override_probability) => Some(emotion),
            _ => Some(frame.expression),
        }
    }
}

/// Maps each amplitude sample to an expression as it arrives.
pub struct AmplitudeStrategy {
    levels: mpsc::Receiver<f32>,
    thresholds: [f32; 4],
}

impl AmplitudeStrategy {
    /// Strategy fed by `levels`.
    pub fn new(levels: mpsc::Receiver<f32>, thresholds: [f32; 4]) -> Self {
        Self { levels, thresholds }
    }
}

#[async_trait]
impl FrameStrategy for AmplitudeStrategy {
    fn name(&self) -> &'static str {
        "amplitude"
    }

    async fn next_frame(&mut self) -> Option<Expression> {
        let level = self.levels.recv().await?;
        Some(amplitude_to_expression(level, &self.thresholds))
    }
}
