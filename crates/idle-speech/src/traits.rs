use crate::{ChatMessage, IdleUtterance, Result};
use async_trait::async_trait;

/// Chat-completion provider.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Run one completion and return the response chunks in arrival order.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Vec<String>>;
}

/// Text-to-speech playback for the character.
#[async_trait]
pub trait SpeechSink: Send + Sync {
    /// Speak `utterance`, resolving once playback has finished.
    async fn speak(&self, session_id: &str, utterance: &IdleUtterance) -> Result<()>;

    /// Drop everything queued or playing.
    fn stop_all(&self);
}
