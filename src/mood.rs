//! # Mood Module
//!
//! Turns raw per-frame emotion classifications into the coarse three-way
//! [`MoodLabel`] used to pick music, and debounces the resulting stream of
//! labels so only *changes* reach the rest of the session.
//!
//! ## Pipeline
//!
//! ```text
//! frame → Classifier → Classification → EmotionSampler → MoodLabel → MoodDebouncer → MoodChangeEvent
//!                           (or None)                       (or None)                    (or None)
//! ```
//!
//! A `None` anywhere in the pipeline means "no update this tick". A detector
//! outage never turns into a mood value.
//!
//! ## Coarsening
//!
//! | raw emotion                          | mood       |
//! |--------------------------------------|------------|
//! | `happy`                              | `happy`    |
//! | `sad`, `disgust`, `fear`             | `sad`      |
//! | `angry`, `surprise`, `neutral`, other| `stressed` |
//! | classifier unavailable / no face     | no update  |

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Coarse mood used to select music.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodLabel {
    Happy,
    Sad,
    Stressed,
}

impl MoodLabel {
    /// Every label, in display order.
    pub const ALL: [MoodLabel; 3] = [MoodLabel::Happy, MoodLabel::Sad, MoodLabel::Stressed];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MoodLabel::Happy => "happy",
            MoodLabel::Sad => "sad",
            MoodLabel::Stressed => "stressed",
        }
    }
}

impl fmt::Display for MoodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the three mood labels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mood `{0}`: expected happy, sad or stressed")]
pub struct UnknownMood(pub String);

impl FromStr for MoodLabel {
    type Err = UnknownMood;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "happy" => Ok(MoodLabel::Happy),
            "sad" => Ok(MoodLabel::Sad),
            "stressed" => Ok(MoodLabel::Stressed),
            _ => Err(UnknownMood(s.to_string())),
        }
    }
}

/// Label set reported by the facial emotion classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawEmotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
    /// Anything the classifier reports outside the known set.
    Other(String),
}

impl RawEmotion {
    /// Collapses the classifier's label into a [`MoodLabel`].
    #[must_use]
    pub fn coarsen(&self) -> MoodLabel {
        match self {
            RawEmotion::Happy => MoodLabel::Happy,
            RawEmotion::Sad | RawEmotion::Disgust | RawEmotion::Fear => MoodLabel::Sad,
            RawEmotion::Angry | RawEmotion::Surprise | RawEmotion::Neutral | RawEmotion::Other(_) => {
                MoodLabel::Stressed
            }
        }
    }

    /// Case-insensitive; unknown labels become [`RawEmotion::Other`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "angry" => RawEmotion::Angry,
            "disgust" => RawEmotion::Disgust,
            "fear" => RawEmotion::Fear,
            "happy" => RawEmotion::Happy,
            "sad" => RawEmotion::Sad,
            "surprise" => RawEmotion::Surprise,
            "neutral" => RawEmotion::Neutral,
            other => RawEmotion::Other(other.to_string()),
        }
    }
}

impl FromStr for RawEmotion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RawEmotion::from_label(s))
    }
}

/// One classifier verdict for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub emotion: RawEmotion,
    /// Classifier score in `[0, 1]`.
    pub confidence: f32,
}

/// Opaque per-frame emotion classifier.
///
/// Returns `None` when nothing could be classified (no face, model failure).
pub trait Classifier {
    /// Whatever the classifier consumes: a video frame, a detector output line, ...
    type Frame;

    fn classify(&self, frame: &Self::Frame) -> Option<Classification>;
}

/// Wraps a [`Classifier`] and coarsens its output into mood labels.
#[derive(Debug, Clone)]
pub struct EmotionSampler<C> {
    classifier: C,
    min_confidence: f32,
}

impl<C: Classifier> EmotionSampler<C> {
    #[must_use]
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            min_confidence: 0.0,
        }
    }

    /// Classifications scoring below `min_confidence` are treated as unavailable.
    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Samples one frame. `None` means "no update this tick".
    pub fn sample(&self, frame: &C::Frame) -> Option<MoodLabel> {
        let Some(classification) = self.classifier.classify(frame) else {
            trace!("Classifier unavailable for this frame");
            return None;
        };

        if classification.confidence < self.min_confidence {
            debug!(
                "Ignoring {:?} at confidence {:.2} (minimum {:.2})",
                classification.emotion, classification.confidence, self.min_confidence
            );
            return None;
        }

        let mood = classification.emotion.coarsen();
        trace!("Sampled {:?} -> {mood}", classification.emotion);
        Some(mood)
    }
}

/// Emitted by [`MoodDebouncer::observe`] on a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoodChangeEvent {
    /// `None` for the first observed mood.
    pub from: Option<MoodLabel>,
    pub to: MoodLabel,
}

impl fmt::Display for MoodChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.from {
            Some(from) => write!(f, "{from} -> {}", self.to),
            None => write!(f, "none -> {}", self.to),
        }
    }
}

/// Edge-triggered filter over sampled moods.
///
/// Repeated identical labels produce nothing; only a label different from the
/// last emitted one produces a [`MoodChangeEvent`].
#[derive(Debug, Clone, Default)]
pub struct MoodDebouncer {
    last_emitted: Option<MoodLabel>,
}

impl MoodDebouncer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, label: MoodLabel) -> Option<MoodChangeEvent> {
        if self.last_emitted == Some(label) {
            return None;
        }

        let event = MoodChangeEvent {
            from: self.last_emitted.replace(label),
            to: label,
        };
        Some(event)
    }

    /// Last emitted mood, `None` before the first sample.
    #[must_use]
    pub fn current(&self) -> Option<MoodLabel> {
        self.last_emitted
    }
}
