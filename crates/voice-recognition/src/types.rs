use companion_context::RecognitionMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-session view of the active back-end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub user_message: String,
    pub is_listening: bool,
    pub is_processing: bool,
    /// Countdown to auto-send; only present once speech with text was heard.
    pub silence_timeout_remaining: Option<Duration>,
}

/// What the voice facade publishes to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStatus {
    pub mode: RecognitionMode,
    pub continuous_listening: bool,
    pub session: SessionSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtteranceSource {
    Voice,
    Typed,
}

/// Text the user finished saying or typing, ready for the chat pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUtterance {
    pub text: String,
    pub source: UtteranceSource,
}

/// Output of a streaming recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Sound that may be speech started; resets the silence clock only.
    SpeechStarted,
    /// Full transcript so far, interim or final.
    Transcript { text: String, is_final: bool },
    /// The recognizer stopped on its own.
    Ended,
}

/// Things a back-end did on its own during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    /// Silence after speech; the transcript was sent and listening stopped.
    AutoSent,
    /// Nothing was said within the initial speech timeout.
    NoSpeechTimeout,
}
