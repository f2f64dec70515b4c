use crate::{
    BackendEvent, RecognitionBackend, Result, SessionSnapshot, SilenceAction, SilenceDetector,
    SpeechStream, StreamEvent, UtteranceOutbox, UtteranceSource,
};
use async_trait::async_trait;
use companion_context::{Clock, RecognitionMode, VoiceSettings};
use std::sync::Arc;
use std::time::Duration;

/// Push-to-talk presses shorter than this are treated as accidental.
const PUSH_TO_TALK_MIN: Duration = Duration::from_secs(1);

/// Continuous recognizer with interim results and silence auto-send.
pub struct BrowserBackend {
    stream: Box<dyn SpeechStream>,
    silence: SilenceDetector,
    outbox: UtteranceOutbox,
    clock: Arc<dyn Clock>,
    language: Option<String>,
    listening: bool,
    transcript: String,
    user_message: String,
    push_to_talk_since: Option<Duration>,
}

impl BrowserBackend {
    pub fn new(
        stream: Box<dyn SpeechStream>,
        settings: &VoiceSettings,
        clock: Arc<dyn Clock>,
        outbox: UtteranceOutbox,
    ) -> Self {
        Self {
            stream,
            silence: SilenceDetector::new(settings, clock.clone()),
            outbox,
            clock,
            language: settings.language.clone(),
            listening: false,
            transcript: String::new(),
            user_message: String::new(),
            push_to_talk_since: None,
        }
    }

    async fn open_stream(&mut self) -> Result<()> {
        if self.listening {
            self.stream.stop();
        }
        self.transcript.clear();
        self.user_message.clear();
        if let Err(e) = self.stream.start(self.language.as_deref()).await {
            self.listening = false;
            self.push_to_talk_since = None;
            return Err(e);
        }
        self.listening = true;
        self.silence.start();
        Ok(())
    }

    fn halt(&mut self) {
        self.silence.clear();
        self.listening = false;
        self.push_to_talk_since = None;
        self.stream.stop();
    }

    fn apply(&mut self, event: StreamEvent) -> bool {
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
            StreamEvent::Ended => return true,
        }
        false
    }
}

#[async_trait]
impl RecognitionBackend for BrowserBackend {
    fn mode(&self) -> RecognitionMode {
        RecognitionMode::Browser
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
        self.open_stream().await?;
        tracing::info!("browser recognition started");
        Ok(())
    }

    async fn stop_listening(&mut self) -> Result<()> {
        self.silence.clear();
        self.listening = false;
        self.stream.stop();

        if let Some(since) = self.push_to_talk_since.take() {
            let held = self.clock.now().saturating_sub(since);
            if held >= PUSH_TO_TALK_MIN
                && !self.silence.is_ended()
                && self.outbox.deliver(&self.transcript, UtteranceSource::Voice)
            {
                self.user_message.clear();
            }
        }
        tracing::info!("browser recognition stopped");
        Ok(())
    }

    fn mark_push_to_talk(&mut self) {
        self.push_to_talk_since = Some(self.clock.now());
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

    async fn tick(&mut self) -> Result<Option<BackendEvent>> {
        if !self.listening {
            return Ok(None);
        }

        let mut ended = false;
        while let Some(event) = self.stream.poll_event() {
            ended |= self.apply(event);
        }
        if ended {
            // the recognizer gave up on its own; keep the session alive
            tracing::debug!("recognizer ended while listening, restarting");
            self.open_stream().await?;
            return Ok(None);
        }

        match self.silence.check(&self.transcript) {
            SilenceAction::AutoSend(text) => {
                tracing::info!("silence detected, sending transcript");
                self.outbox.deliver(&text, UtteranceSource::Voice);
                self.user_message.clear();
                self.halt();
                Ok(Some(BackendEvent::AutoSent))
            }
            SilenceAction::AutoStop => {
                tracing::info!("no speech detected, stopping recognition");
                self.halt();
                Ok(Some(BackendEvent::NoSpeechTimeout))
            }
            SilenceAction::Continue | SilenceAction::SpeechEnded => Ok(None),
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

    struct Rig {
        backend: BrowserBackend,
        providers: MockProviders,
        clock: ManualClock,
        ctx: HomeContext,
        rx: mpsc::UnboundedReceiver<UserUtterance>,
    }

    fn rig() -> Rig {
        let providers = MockProviders::new();
        let clock = ManualClock::new();
        let ctx = HomeContext::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = VoiceSettings {
            no_speech_timeout_secs: 2.0,
            initial_speech_timeout_secs: 5.0,
            ..VoiceSettings::default()
        };
        let backend = BrowserBackend::new(
            providers.speech_stream().unwrap(),
            &settings,
            Arc::new(clock.clone()),
            UtteranceOutbox::new(tx, ctx.clone()),
        );
        Rig {
            backend,
            providers,
            clock,
            ctx,
            rx,
        }
    }

    fn transcript(text: &str) -> StreamEvent {
        StreamEvent::Transcript {
            text: text.to_string(),
            is_final: false,
        }
    }

    #[tokio::test]
    async fn test_interim_results_update_message() {
        let mut r = rig();
        r.backend.start_listening().await.unwrap();
        r.providers.push_stream_event(transcript("hel"));
        r.providers.push_stream_event(transcript("hello"));
        r.backend.tick().await.unwrap();

        let snap = r.backend.snapshot();
        assert!(snap.is_listening);
        assert_eq!(snap.user_message, "hello");
        assert_eq!(snap.silence_timeout_remaining, Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_silence_auto_sends_transcript() {
        let mut r = rig();
        r.backend.start_listening().await.unwrap();
        r.providers.push_stream_event(transcript("what time is it"));
        r.backend.tick().await.unwrap();

        r.clock.advance_secs(2);
        let ev = r.backend.tick().await.unwrap();
        assert_eq!(ev, Some(BackendEvent::AutoSent));
        assert_eq!(r.rx.try_recv().unwrap().text, "what time is it");
        // one for the transcript, one for the delivery
        assert_eq!(r.ctx.user_activity_seq(), 2);

        let snap = r.backend.snapshot();
        assert!(!snap.is_listening);
        assert!(snap.user_message.is_empty());
        assert_eq!(snap.silence_timeout_remaining, None);
    }

    #[tokio::test]
    async fn test_ongoing_speech_counts_as_activity() {
        let mut r = rig();
        r.backend.start_listening().await.unwrap();
        r.providers.push_stream_event(StreamEvent::SpeechStarted);
        r.backend.tick().await.unwrap();
        assert_eq!(r.ctx.user_activity_seq(), 1);

        r.providers.push_stream_event(transcript("good"));
        r.providers.push_stream_event(transcript("good"));
        r.providers.push_stream_event(transcript("good morning"));
        r.backend.tick().await.unwrap();
        assert_eq!(r.ctx.user_activity_seq(), 3);
        assert!(r.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_initial_silence_stops() {
        let mut r = rig();
        r.backend.start_listening().await.unwrap();
        r.clock.advance_secs(5);
        let ev = r.backend.tick().await.unwrap();
        assert_eq!(ev, Some(BackendEvent::NoSpeechTimeout));
        assert!(!r.backend.is_listening());
        assert!(r.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_push_to_talk_sends_on_release() {
        let mut r = rig();
        r.backend.mark_push_to_talk();
        r.backend.start_listening().await.unwrap();
        r.providers.push_stream_event(transcript("turn on the lights"));
        r.backend.tick().await.unwrap();
        r.clock.advance(Duration::from_millis(1200));
        r.backend.stop_listening().await.unwrap();
        assert_eq!(r.rx.try_recv().unwrap().text, "turn on the lights");
    }

    #[tokio::test]
    async fn test_short_push_to_talk_is_ignored() {
        let mut r = rig();
        r.backend.mark_push_to_talk();
        r.backend.start_listening().await.unwrap();
        r.providers.push_stream_event(transcript("oops"));
        r.backend.tick().await.unwrap();
        r.clock.advance(Duration::from_millis(300));
        r.backend.stop_listening().await.unwrap();
        assert!(r.rx.try_recv().is_err());
        assert_eq!(r.backend.snapshot().user_message, "oops");
    }

    #[tokio::test]
    async fn test_typed_message() {
        let mut r = rig();
        r.backend.handle_input_change("  ");
        assert!(!r.backend.handle_send_message().await.unwrap());
        r.backend.handle_input_change("typed hello");
        assert!(r.backend.handle_send_message().await.unwrap());
        let got = r.rx.try_recv().unwrap();
        assert_eq!(got.source, UtteranceSource::Typed);
        assert!(r.backend.snapshot().user_message.is_empty());
    }

    #[tokio::test]
    async fn test_recognizer_end_restarts() {
        let mut r = rig();
        r.backend.start_listening().await.unwrap();
        r.providers.push_stream_event(StreamEvent::Ended);
        r.backend.tick().await.unwrap();
        assert!(r.backend.is_listening());
        assert_eq!(r.providers.count("stream.start"), 2);
    }

    #[tokio::test]
    async fn test_permission_denied_leaves_idle() {
        let mut r = rig();
        r.providers.deny_microphone();
        let err = r.backend.start_listening().await.unwrap_err();
        assert!(err.is_terminal());
        assert!(!r.backend.is_listening());
    }
}
