use thiserror::Error;

pub type Result<T, E = VoiceError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("microphone permission denied: {0}")]
    Permission(String),
    #[error("audio device unavailable: {0}")]
    Device(String),
    #[error("speech recognition not supported: {0}")]
    Unsupported(String),
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("realtime link error: {0}")]
    Link(String),
    #[error("voice recognition actor stopped")]
    Closed,
}

impl VoiceError {
    /// Permission and missing-hardware failures need user action; retrying
    /// on our own will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VoiceError::Permission(_) | VoiceError::Device(_) | VoiceError::Unsupported(_)
        )
    }
}
