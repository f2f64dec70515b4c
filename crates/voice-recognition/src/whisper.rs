use crate::{
    AudioCapture, BackendEvent, RecognitionBackend, Result, SessionSnapshot, SilenceAction,
    SilenceDetector, Transcriber, UtteranceOutbox, UtteranceSource,
};
use async_trait::async_trait;
use companion_context::{Clock, RecognitionMode, VoiceSettings};
use std::sync::Arc;

/// Records a clip and transcribes it once listening stops.
///
/// Stopping hands the clip over and raises the processing flag; the
/// transcription itself runs on the next tick so observers see the flag while
/// the request is in flight.
pub struct WhisperBackend {
    capture: Box<dyn AudioCapture>,
    transcriber: Arc<dyn Transcriber>,
    silence: SilenceDetector,
    outbox: UtteranceOutbox,
    language: Option<String>,
    listening: bool,
    processing: bool,
    pending: Option<Vec<i16>>,
    user_message: String,
}

impl WhisperBackend {
    pub fn new(
        capture: Box<dyn AudioCapture>,
        transcriber: Arc<dyn Transcriber>,
        settings: &VoiceSettings,
        clock: Arc<dyn Clock>,
        outbox: UtteranceOutbox,
    ) -> Self {
        Self {
            capture,
            transcriber,
            silence: SilenceDetector::new(settings, clock),
            outbox,
            language: settings.language.clone(),
            listening: false,
            processing: false,
            pending: None,
            user_message: String::new(),
        }
    }

    async fn transcribe_pending(&mut self, pcm: Vec<i16>) {
        let sample_rate = self.capture.sample_rate();
        tracing::debug!(samples = pcm.len(), sample_rate, "transcribing clip");
        match self
            .transcriber
            .transcribe(&pcm, sample_rate, self.language.as_deref())
            .await
        {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!("transcription received");
                self.outbox.deliver(&text, UtteranceSource::Voice);
            }
            Ok(_) => tracing::info!("transcription empty, no speech detected"),
            Err(e) => tracing::warn!(error = %e, "transcription failed"),
        }
    }

    async fn discard_recording(&mut self) -> Result<()> {
        self.silence.clear();
        self.listening = false;
        let _ = self.capture.stop().await?;
        Ok(())
    }
}

#[async_trait]
impl RecognitionBackend for WhisperBackend {
    fn mode(&self) -> RecognitionMode {
        RecognitionMode::Whisper
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_message: self.user_message.clone(),
            is_listening: self.listening,
            is_processing: self.processing,
            silence_timeout_remaining: None,
        }
    }

    async fn start_listening(&mut self) -> Result<()> {
        self.user_message.clear();
        self.capture.start().await?;
        self.listening = true;
        self.silence.start();
        tracing::info!("whisper recording started");
        Ok(())
    }

    async fn stop_listening(&mut self) -> Result<()> {
        self.silence.clear();
        if !self.listening {
            return Ok(());
        }
        self.listening = false;
        let pcm = self.capture.stop().await?;
        tracing::info!(samples = pcm.len(), "whisper recording stopped");
        if !pcm.is_empty() {
            self.pending = Some(pcm);
            self.processing = true;
        }
        Ok(())
    }

    fn handle_input_change(&mut self, text: &str) {
        self.user_message = text.to_string();
    }

    async fn handle_send_message(&mut self) -> Result<bool> {
        if self.outbox.deliver(&self.user_message, UtteranceSource::Typed) {
            self.user_message.clear();
            return Ok(true);
        }
        Ok(false)
    }

    async fn finish(&mut self) -> Result<()> {
        if self.listening {
            self.stop_listening().await?;
        }
        if let Some(pcm) = self.pending.take() {
            self.transcribe_pending(pcm).await;
            self.processing = false;
        }
        Ok(())
    }

    async fn tick(&mut self) -> Result<Option<BackendEvent>> {
        if let Some(pcm) = self.pending.take() {
            self.transcribe_pending(pcm).await;
            self.processing = false;
            return Ok(None);
        }

        if !self.listening {
            return Ok(None);
        }
        if self.capture.take_voice_activity() {
            self.silence.on_voice_activity();
            self.outbox.mark_activity();
        }
        match self.silence.check_audio() {
            SilenceAction::AutoStop => {
                tracing::info!("no speech detected, discarding recording");
                self.discard_recording().await?;
                Ok(Some(BackendEvent::NoSpeechTimeout))
            }
            SilenceAction::SpeechEnded => {
                self.stop_listening().await?;
                Ok(None)
            }
            SilenceAction::Continue | SilenceAction::AutoSend(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProviders;
    use crate::{ProviderFactory, UserUtterance};
    use companion_context::{HomeContext, ManualClock};
    use tokio::sync::mpsc;

    fn backend(
        providers: &MockProviders,
        clock: &ManualClock,
    ) -> (WhisperBackend, mpsc::UnboundedReceiver<UserUtterance>) {
        backend_with_context(providers, clock, &HomeContext::new())
    }

    fn backend_with_context(
        providers: &MockProviders,
        clock: &ManualClock,
        ctx: &HomeContext,
    ) -> (WhisperBackend, mpsc::UnboundedReceiver<UserUtterance>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = VoiceSettings {
            no_speech_timeout_secs: 1.0,
            initial_speech_timeout_secs: 5.0,
            ..VoiceSettings::default()
        };
        let b = WhisperBackend::new(
            providers.audio_capture().unwrap(),
            providers.transcriber().unwrap(),
            &settings,
            Arc::new(clock.clone()),
            UtteranceOutbox::new(tx, ctx.clone()),
        );
        (b, rx)
    }

    #[tokio::test]
    async fn test_stop_transcribes_with_processing_flag() {
        let providers = MockProviders::new();
        providers.set_transcript("what's the weather");
        let clock = ManualClock::new();
        let (mut b, mut rx) = backend(&providers, &clock);

        b.start_listening().await.unwrap();
        assert!(b.is_listening());
        b.stop_listening().await.unwrap();

        let snap = b.snapshot();
        assert!(!snap.is_listening);
        assert!(snap.is_processing);
        assert_eq!(providers.count("transcribe"), 0);

        b.tick().await.unwrap();
        assert!(!b.snapshot().is_processing);
        assert_eq!(rx.try_recv().unwrap().text, "what's the weather");
    }

    #[tokio::test]
    async fn test_empty_recording_is_not_sent() {
        let providers = MockProviders::new();
        providers.set_recording(Vec::new());
        let clock = ManualClock::new();
        let (mut b, mut rx) = backend(&providers, &clock);

        b.start_listening().await.unwrap();
        b.stop_listening().await.unwrap();
        assert!(!b.snapshot().is_processing);
        b.tick().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_transcription_failure_clears_processing() {
        let providers = MockProviders::new();
        providers.fail_transcription();
        let clock = ManualClock::new();
        let (mut b, mut rx) = backend(&providers, &clock);

        b.start_listening().await.unwrap();
        b.stop_listening().await.unwrap();
        b.tick().await.unwrap();
        assert!(!b.snapshot().is_processing);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_speech_then_silence_stops_recording() {
        let providers = MockProviders::new();
        let clock = ManualClock::new();
        let (mut b, _rx) = backend(&providers, &clock);

        b.start_listening().await.unwrap();
        clock.advance_secs(1);
        providers.set_voice_activity(true);
        b.tick().await.unwrap();
        clock.advance_secs(1);
        b.tick().await.unwrap();
        assert!(!b.is_listening());
        assert!(b.snapshot().is_processing);
    }

    #[tokio::test]
    async fn test_initial_silence_discards_recording() {
        let providers = MockProviders::new();
        let clock = ManualClock::new();
        let (mut b, _rx) = backend(&providers, &clock);

        b.start_listening().await.unwrap();
        clock.advance_secs(5);
        assert_eq!(b.tick().await.unwrap(), Some(BackendEvent::NoSpeechTimeout));
        assert!(!b.is_listening());
        assert!(!b.snapshot().is_processing);
        assert_eq!(providers.count("transcribe"), 0);
    }

    #[tokio::test]
    async fn test_voice_activity_counts_as_user_activity() {
        let providers = MockProviders::new();
        let clock = ManualClock::new();
        let ctx = HomeContext::new();
        let (mut b, _rx) = backend_with_context(&providers, &clock, &ctx);

        b.start_listening().await.unwrap();
        b.tick().await.unwrap();
        assert_eq!(ctx.user_activity_seq(), 0);

        providers.set_voice_activity(true);
        b.tick().await.unwrap();
        assert_eq!(ctx.user_activity_seq(), 1);
    }

    #[tokio::test]
    async fn test_finish_transcribes_pending_clip() {
        let providers = MockProviders::new();
        providers.set_transcript("remember the milk");
        let clock = ManualClock::new();
        let (mut b, mut rx) = backend(&providers, &clock);

        b.start_listening().await.unwrap();
        b.stop_listening().await.unwrap();
        assert!(b.snapshot().is_processing);

        b.finish().await.unwrap();
        assert!(!b.snapshot().is_processing);
        assert_eq!(rx.try_recv().unwrap().text, "remember the milk");

        b.finish().await.unwrap();
        assert_eq!(providers.count("transcribe"), 1);
    }

    #[tokio::test]
    async fn test_finish_while_recording_stops_and_transcribes() {
        let providers = MockProviders::new();
        providers.set_transcript("lights off");
        let clock = ManualClock::new();
        let (mut b, mut rx) = backend(&providers, &clock);

        b.start_listening().await.unwrap();
        b.finish().await.unwrap();
        assert!(!b.is_listening());
        assert_eq!(rx.try_recv().unwrap().text, "lights off");
    }
}
