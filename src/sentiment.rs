//! Keyword emotion detection for reply text.
//!
//! A reply is scanned against a fixed keyword table and mapped to one of a
//! closed set of [`Emotion`]s. The table is ordered: the first emotion with a
//! matching keyword wins, so a reply that both praises and exclaims smiles.

use crate::viseme::Expression;

/// Emotion detected in a reply.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    /// No keyword matched.
    #[default]
    Neutral,
    /// Praise, warmth, agreement.
    Smile,
    /// Exclamation or surprise.
    Surprise,
}

impl Emotion {
    /// Short name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Smile => "smile",
            Self::Surprise => "surprise",
        }
    }

    /// Expression that may replace a frame while speaking.
    pub fn expression(self) -> Option<Expression> {
        match self {
            Self::Neutral => None,
            Self::Smile => Some(Expression::Smiling),
            Self::Surprise => Some(Expression::MouthOpen),
        }
    }

    /// Expression held briefly after playback ends, if any.
    pub fn settle_expression(self) -> Option<Expression> {
        match self {
            Self::Smile => Some(Expression::Smiling),
            Self::Neutral | Self::Surprise => None,
        }
    }
}

// ── Keyword table ───────────────────────────────────────────────────────

/// (emotion, keywords), checked in order.
const EMOTION_TABLE: &[(Emotion, &[&str])] = &[
    (
        Emotion::Smile,
        &[
            "happy",
            "great",
            "wonderful",
            "excellent",
            "proud",
            "good job",
            "well done",
            "chinna",
            "haha",
            "nice",
            "correct",
            "right",
            "bagundi",
            "super",
        ],
    ),
    (
        Emotion::Surprise,
        &["wow", "amazing", "incredible", "surprised", "really", "arre"],
    ),
];

/// Detect the emotion of `text` by case-insensitive substring match.
pub fn detect_emotion(text: &str) -> Emotion {
    let lower = text.to_lowercase();
    EMOTION_TABLE
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map_or(Emotion::Neutral, |&(emotion, _)| emotion)
}
