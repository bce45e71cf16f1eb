//! Mouth-shape mapping for lip-sync animation.
//!
//! An [`Expression`] is one of a closed set of face images. Text is mapped
//! character by character into coarse phoneme classes; live audio is mapped
//! by amplitude bucket.

use std::time::Duration;

/// A named face state. Exactly one is shown at a time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expression {
    /// Resting face.
    #[default]
    Neutral,
    /// Lips pressed together (M/B/P).
    MouthClosed,
    /// Rounded lips (O/U/W).
    MouthRound,
    /// Wide open (A/E).
    MouthOpen,
    /// Slightly parted; the default speaking shape.
    SlightOpen,
    /// Big smile.
    Smiling,
}

impl Expression {
    /// Every expression, in asset-loading order.
    pub const ALL: [Expression; 6] = [
        Expression::Neutral,
        Expression::SlightOpen,
        Expression::MouthClosed,
        Expression::MouthRound,
        Expression::MouthOpen,
        Expression::Smiling,
    ];

    /// Short name for logs and UIs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::MouthClosed => "mouth_closed",
            Self::MouthRound => "mouth_round",
            Self::MouthOpen => "mouth_open",
            Self::SlightOpen => "slight_open",
            Self::Smiling => "smile",
        }
    }

    /// Image file name inside the assets directory.
    pub fn asset_file(self) -> &'static str {
        match self {
            Self::Neutral => "neutral.jpg",
            Self::MouthClosed => "mouth_closed_mm.jpg",
            Self::MouthRound => "mouth_round_oh.jpg",
            Self::MouthOpen => "mouth_open_ah.jpg",
            Self::SlightOpen => "slight_open.jpg",
            Self::Smiling => "big_smile.jpg",
        }
    }
}

/// Phoneme class for one character of reply text.
pub fn char_expression(c: char) -> Expression {
    if c.is_whitespace() {
        return Expression::Neutral;
    }
    match c.to_ascii_uppercase() {
        'M' | 'B' | 'P' => Expression::MouthClosed,
        'O' | 'U' | 'W' => Expression::MouthRound,
        'A' | 'E' => Expression::MouthOpen,
        _ => Expression::SlightOpen,
    }
}

/// Estimated speaking time for `text`.
pub fn estimate_speaking_duration(text: &str, ms_per_char: u64) -> Duration {
    Duration::from_millis(text.chars().count() as u64 * ms_per_char)
}

/// One frame of a text-timed plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedFrame {
    /// What to show.
    pub expression: Expression,
    /// How long to show it.
    pub duration: Duration,
}

/// Build a text-timed plan: one frame per character, spread evenly over
/// `duration`, each at least `min_frame` long.
///
/// Empty text yields a single neutral frame held for the whole duration.
pub fn text_plan(text: &str, duration: Duration, min_frame: Duration) -> Vec<TimedFrame> {
    let shapes: Vec<Expression> = text.chars().map(char_expression).collect();
    if shapes.is_empty() {
        return vec![TimedFrame {
            expression: Expression::Neutral,
            duration: duration.max(min_frame),
        }];
    }

    let count = u32::try_from(shapes.len()).unwrap_or(u32::MAX);
    let frame_time = (duration / count).max(min_frame);
    shapes
        .into_iter()
        .map(|expression| TimedFrame {
            expression,
            duration: frame_time,
        })
        .collect()
}

/// Total time covered by a plan.
pub fn plan_duration(plan: &[TimedFrame]) -> Duration {
    plan.iter().map(|f| f.duration).sum()
}

/// Map a `0.0..=1.0` amplitude to an expression using four ascending
/// thresholds: silence, low, medium, high, very high.
pub fn amplitude_to_expression(level: f32, thresholds: &[f32; 4]) -> Expression {
    if level < thresholds[0] {
        Expression::Neutral
    } else if level < thresholds[1] {
        Expression::MouthClosed
    } else if level < thresholds[2] {
        Expression::SlightOpen
    } else if level < thresholds[3] {
        Expression::MouthRound
    } else {
        Expression::MouthOpen
    }
}
