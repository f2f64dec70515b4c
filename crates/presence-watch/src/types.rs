use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One frame's worth of face detection output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub face_detected: bool,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

impl DetectionResult {
    pub fn face(confidence: f32) -> Self {
        Self {
            face_detected: true,
            confidence,
            bounding_box: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            face_detected: false,
            confidence: 0.0,
            bounding_box: None,
        }
    }
}

/// Side effects requested by a presence transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    PersonDetected,
    /// Speak the configured greeting.
    GreetingStart(String),
    GreetingComplete,
    /// The visitor left mid-greeting; stop the greeting speech.
    InterruptGreeting,
    PersonDeparted,
}
