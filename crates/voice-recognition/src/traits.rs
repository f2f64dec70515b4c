use crate::{BackendEvent, Result, SessionSnapshot, StreamEvent};
use async_trait::async_trait;
use companion_context::RecognitionMode;
use std::sync::Arc;

/// Streaming recognizer producing interim and final transcripts.
#[async_trait]
pub trait SpeechStream: Send {
    async fn start(&mut self, language: Option<&str>) -> Result<()>;
    fn stop(&mut self);
    /// Next pending event, without waiting.
    fn poll_event(&mut self) -> Option<StreamEvent>;
}

/// Microphone recording for back-ends that transcribe whole clips.
#[async_trait]
pub trait AudioCapture: Send {
    async fn start(&mut self) -> Result<()>;
    /// Stop recording and hand back the captured mono PCM.
    async fn stop(&mut self) -> Result<Vec<i16>>;
    fn sample_rate(&self) -> u32;
    /// Whether speech-level audio arrived since the previous call.
    fn take_voice_activity(&mut self) -> bool {
        false
    }
}

/// Speech-to-text for recorded clips.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, pcm: &[i16], sample_rate: u32, language: Option<&str>)
        -> Result<String>;
}

/// Connection to a hosted speech-to-speech model.
#[async_trait]
pub trait RealtimeLink: Send {
    fn is_ready(&self) -> bool;
    /// Append audio to the input buffer and commit it as one user turn.
    async fn commit_audio(&mut self, pcm: &[i16], sample_rate: u32) -> Result<()>;
    async fn send_text(&mut self, text: &str) -> Result<()>;
}

/// One listening strategy behind the voice facade.
#[async_trait]
pub trait RecognitionBackend: Send {
    fn mode(&self) -> RecognitionMode;
    fn snapshot(&self) -> SessionSnapshot;

    fn is_listening(&self) -> bool {
        self.snapshot().is_listening
    }

    async fn start_listening(&mut self) -> Result<()>;
    async fn stop_listening(&mut self) -> Result<()>;

    /// The next session is push-to-talk: the transcript is sent when the user
    /// lets go, unless it was already auto-sent.
    fn mark_push_to_talk(&mut self) {}

    fn handle_input_change(&mut self, text: &str);

    /// Send the typed message, if any. Returns whether something was sent.
    async fn handle_send_message(&mut self) -> Result<bool>;

    /// Close the session and complete any captured input before the back-end
    /// is dropped.
    async fn finish(&mut self) -> Result<()> {
        if self.is_listening() {
            self.stop_listening().await?;
        }
        Ok(())
    }

    /// Drive timers and pending work; called about ten times a second.
    async fn tick(&mut self) -> Result<Option<BackendEvent>> {
        Ok(None)
    }
}

/// Builds the provider objects back-ends are assembled from.
pub trait ProviderFactory: Send + Sync {
    fn speech_stream(&self) -> Result<Box<dyn SpeechStream>>;
    fn audio_capture(&self) -> Result<Box<dyn AudioCapture>>;
    fn transcriber(&self) -> Result<Arc<dyn Transcriber>>;
    fn realtime_link(&self) -> Result<Box<dyn RealtimeLink>>;
}
