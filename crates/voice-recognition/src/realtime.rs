use crate::{
    AudioCapture, BackendEvent, RealtimeLink, RecognitionBackend, Result, SessionSnapshot,
    SilenceAction, SilenceDetector, SpeechStream, StreamEvent, UtteranceOutbox, VoiceError,
};
use async_trait::async_trait;
use companion_context::{Clock, RecognitionMode, VoiceSettings};
use std::sync::Arc;

/// Push-to-talk into a hosted speech-to-speech model.
///
/// Audio is recorded while listening and committed to the link as one turn
/// on stop. A local recognizer runs alongside for the on-screen transcript and
/// silence handling.
pub struct RealtimeBackend {
    capture: Box<dyn AudioCapture>,
    stream: Box<dyn SpeechStream>,
    link: Box<dyn RealtimeLink>,
    silence: SilenceDetector,
    outbox: UtteranceOutbox,
    language: Option<String>,
    listening: bool,
    transcript: String,
    user_message: String,
}

impl RealtimeBackend {
    pub fn new(
        capture: Box<dyn AudioCapture>,
        stream: Box<dyn SpeechStream>,
        link: Box<dyn RealtimeLink>,
        settings: &VoiceSettings,
        clock: Arc<dyn Clock>,
        outbox: UtteranceOutbox,
    ) -> Self {
        Self {
            capture,
            stream,
            link,
            silence: SilenceDetector::new(settings, clock),
            outbox,
            language: settings.language.clone(),
            listening: false,
            transcript: String::new(),
            user_message: String::new(),
        }
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        if !self.link.is_ready() {
            return Err(VoiceError::Link("realtime session not connected".into()));
        }
        self.link.send_text(text).await?;
        self.outbox.mark_activity();
        Ok(())
    }

    /// End the session without committing the recording.
    async fn abandon(&mut self) -> Result<()> {
        self.silence.clear();
        self.listening = false;
        self.stream.stop();
        let _ = self.capture.stop().await?;
        Ok(())
    }
}

#[async_trait]
impl RecognitionBackend for RealtimeBackend {
    fn mode(&self) -> RecognitionMode {
        RecognitionMode::Realtime
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_message: self.user_message.clone(),
            is_listening: self.listening,
            is_processing: false,
            silence_timeout_remaining: self.silence.remaining(&self.transcript),
        }
    }

    async fn start_listening(&mut self) -> Result<()> {
        if self.listening {
            self.stream.stop();
        }
        self.transcript.clear();
        self.user_message.clear();

        self.stream.start(self.language.as_deref()).await?;
        if let Err(e) = self.capture.start().await {
            self.stream.stop();
            self.listening = false;
            return Err(e);
        }
        self.listening = true;
        self.silence.start();
        tracing::info!("realtime push-to-talk started");
        Ok(())
    }

    async fn stop_listening(&mut self) -> Result<()> {
        self.silence.clear();
        self.stream.stop();
        if !self.listening {
            return Ok(());
        }
        self.listening = false;

        let pcm = self.capture.stop().await?;
        if pcm.is_empty() {
            return Ok(());
        }
        if !self.link.is_ready() {
            tracing::warn!("realtime session not connected, recording dropped");
            return Ok(());
        }
        let sample_rate = self.capture.sample_rate();
        self.link.commit_audio(&pcm, sample_rate).await?;
        self.outbox.mark_activity();
        tracing::info!(samples = pcm.len(), "realtime turn committed");
        Ok(())
    }

    fn handle_input_change(&mut self, text: &str) {
        self.user_message = text.to_string();
    }

    async fn handle_send_message(&mut self) -> Result<bool> {
        let text = self.user_message.trim().to_string();
        if text.is_empty() {
            return Ok(false);
        }
        self.send_text(&text).await?;
        self.user_message.clear();
        Ok(true)
    }

    async fn tick(&mut self) -> Result<Option<BackendEvent>> {
        if !self.listening {
            return Ok(None);
        }
        while let Some(event) = self.stream.poll_event() {
            match event {
                StreamEvent::SpeechStarted => {
                    self.silence.on_speech_start();
                    self.outbox.mark_activity();
                }
                StreamEvent::Transcript { text, .. } => {
                    self.silence.on_transcript(&text);
                    if text.trim() != self.transcript.trim() && !text.trim().is_empty() {
                        self.outbox.mark_activity();
                    }
                    self.user_message.clone_from(&text);
                    self.transcript = text;
                }
                StreamEvent::Ended => tracing::debug!("realtime transcript stream ended"),
            }
        }

        match self.silence.check(&self.transcript) {
            SilenceAction::AutoSend(text) => {
                self.abandon().await?;
                self.user_message.clear();
                self.send_text(&text).await?;
                Ok(Some(BackendEvent::AutoSent))
            }
            SilenceAction::AutoStop => {
                tracing::info!("no speech detected, ending push-to-talk");
                self.abandon().await?;
                Ok(Some(BackendEvent::NoSpeechTimeout))
            }
            SilenceAction::Continue | SilenceAction::SpeechEnded => Ok(None),
        }
    }
}
