use serde::{Deserialize, Serialize};
use std::fmt;

/// Which hand a detection belongs to, as reported by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// One hand found in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandDetection {
    /// `None` when the classifier could not tell left from right.
    #[serde(default)]
    pub handedness: Option<Handedness>,
    #[serde(default = "default_score")]
    pub score: f32,
}

fn default_score() -> f32 {
    1.0
}

impl HandDetection {
    pub fn new(handedness: Option<Handedness>, score: f32) -> Self {
        Self { handedness, score }
    }
}

/// Discrete hand-presence state forwarded to the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandState {
    NoHand,
    LeftHand,
    RightHand,
    BothHands,
}

impl HandState {
    /// Map a set of detections to a state.
    ///
    /// - no detections: `NoHand`
    /// - one detection: the labelled hand, or `None` when the classifier
    ///   gave no label; a hand is in view but its side is unknown
    /// - two or more: `BothHands`, whatever the labels say
    pub fn from_detections(detections: &[HandDetection]) -> Option<Self> {
        match detections {
            [] => Some(HandState::NoHand),
            [single] => match single.handedness {
                Some(Handedness::Left) => Some(HandState::LeftHand),
                Some(Handedness::Right) => Some(HandState::RightHand),
                None => None,
            },
            _ => Some(HandState::BothHands),
        }
    }

    /// Label sent on the wire and shown in the preview.
    pub fn label(&self) -> &'static str {
        match self {
            HandState::NoHand => "No Hand",
            HandState::LeftHand => "Left Hand",
            HandState::RightHand => "Right Hand",
            HandState::BothHands => "Both Hands",
        }
    }

    pub fn as_payload(&self) -> &'static [u8] {
        self.label().as_bytes()
    }
}

impl fmt::Display for HandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
