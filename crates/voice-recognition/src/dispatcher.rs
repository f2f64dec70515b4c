use crate::{
    new_recognition_backend, BackendContext, BackendEvent, ProviderFactory, RecognitionBackend,
    Result, SessionSnapshot, UserUtterance, UtteranceOutbox, VoiceStatus,
};
use companion_context::{Clock, HomeContext, RecognitionMode, VoiceSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Delay before the microphone reopens after the character stops talking.
const RESTART_DELAY: Duration = Duration::from_millis(300);
/// How often continuous mode checks that the microphone is still open.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

type SpeechStopHook = Box<dyn Fn() + Send + Sync>;

/// Routes the listening facade to exactly one active back-end.
///
/// Switching mode stops a listening back-end before the replacement is built,
/// so two back-ends never hold the microphone at once.
pub struct VoiceRecognitionDispatcher {
    providers: Box<dyn ProviderFactory>,
    bctx: BackendContext,
    ctx: HomeContext,
    backend: Box<dyn RecognitionBackend>,
    continuous: bool,
    restart_at: Option<Duration>,
    next_keepalive_at: Duration,
    stop_speech: Option<SpeechStopHook>,
}

impl VoiceRecognitionDispatcher {
    pub fn new(
        settings: VoiceSettings,
        providers: Box<dyn ProviderFactory>,
        ctx: HomeContext,
        clock: Arc<dyn Clock>,
        utterances: mpsc::UnboundedSender<UserUtterance>,
    ) -> Result<Self> {
        let continuous = settings.continuous_mic_listening;
        let bctx = BackendContext {
            settings,
            clock,
            outbox: UtteranceOutbox::new(utterances, ctx.clone()),
        };
        let backend =
            new_recognition_backend(bctx.settings.recognition_mode, providers.as_ref(), &bctx)?;
        Ok(Self {
            providers,
            bctx,
            ctx,
            backend,
            continuous,
            restart_at: None,
            next_keepalive_at: Duration::ZERO,
            stop_speech: None,
        })
    }

    /// Hook that flushes queued character speech (TTS playback).
    pub fn set_speech_stop_hook<F>(&mut self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stop_speech = Some(Box::new(hook));
    }

    pub fn mode(&self) -> RecognitionMode {
        self.backend.mode()
    }

    pub fn continuous_listening(&self) -> bool {
        self.continuous
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.backend.snapshot()
    }

    pub fn status(&self) -> VoiceStatus {
        VoiceStatus {
            mode: self.mode(),
            continuous_listening: self.continuous,
            session: self.snapshot(),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.backend.is_listening()
    }

    /// Open the microphone on the user's request. Counts as user activity so
    /// idle speech backs off before the user talks.
    pub async fn start_listening(&mut self) -> Result<()> {
        self.ctx.record_user_activity();
        self.open_microphone().await
    }

    pub async fn stop_listening(&mut self) -> Result<()> {
        self.restart_at = None;
        let res = self.backend.stop_listening().await;
        self.publish_listening();
        res
    }

    /// Close the session and complete captured input, e.g. before shutdown.
    pub async fn finish(&mut self) -> Result<()> {
        self.restart_at = None;
        let res = self.backend.finish().await;
        self.publish_listening();
        res
    }

    pub async fn toggle_listening(&mut self) -> Result<()> {
        if self.is_listening() {
            return self.stop_listening().await;
        }
        self.silence_character();
        self.backend.mark_push_to_talk();
        self.start_listening().await
    }

    pub fn handle_input_change(&mut self, text: &str) {
        self.backend.handle_input_change(text);
    }

    pub async fn handle_send_message(&mut self) -> Result<bool> {
        if self.snapshot().user_message.trim().is_empty() {
            return Ok(false);
        }
        self.silence_character();
        self.backend.handle_send_message().await
    }

    /// The user pressed stop while the character was talking.
    pub fn handle_stop_speaking(&mut self) {
        self.silence_character();
        self.schedule_restart();
    }

    /// The character finished an utterance.
    pub fn on_speak_completion(&mut self) {
        self.schedule_restart();
    }

    pub async fn set_continuous_listening(&mut self, enabled: bool) -> Result<()> {
        self.continuous = enabled;
        tracing::info!(enabled, "continuous listening");
        if enabled && !self.is_listening() && self.can_auto_listen() {
            self.start_listening().await?;
        }
        Ok(())
    }

    /// Switch to another back-end. A listening back-end is stopped exactly
    /// once, and a recording awaiting transcription is delivered, before the
    /// new one is created.
    pub async fn set_mode(&mut self, mode: RecognitionMode) -> Result<()> {
        if mode == self.mode() {
            return Ok(());
        }
        if let Err(e) = self.finish().await {
            tracing::warn!(mode = %self.mode(), error = %e, "finishing previous back-end failed");
        }
        let next = new_recognition_backend(mode, self.providers.as_ref(), &self.bctx)?;
        tracing::info!(from = %self.mode(), to = %mode, "recognition mode switched");
        self.backend = next;
        self.bctx.settings.recognition_mode = mode;
        Ok(())
    }

    /// Drive the active back-end and continuous-listening timers.
    pub async fn tick(&mut self) {
        match self.backend.tick().await {
            Ok(Some(BackendEvent::NoSpeechTimeout)) if self.continuous => {
                tracing::info!("no speech detected, continuous listening turned off");
                self.continuous = false;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "recognition tick failed"),
        }
        self.publish_listening();

        let now = self.bctx.clock.now();
        if self.restart_at.is_some_and(|at| now >= at) {
            self.restart_at = None;
            if !self.is_listening() && self.can_auto_listen() {
                tracing::info!("reopening microphone");
                if let Err(e) = self.open_microphone().await {
                    tracing::debug!(error = %e, "reopening microphone failed");
                }
            }
        }

        if self.continuous && self.mode() == RecognitionMode::Browser && now >= self.next_keepalive_at
        {
            self.next_keepalive_at = now + KEEPALIVE_INTERVAL;
            if !self.is_listening() && self.can_auto_listen() {
                tracing::debug!("continuous listening: microphone was off, restarting");
                if let Err(e) = self.open_microphone().await {
                    tracing::debug!(error = %e, "continuous listening restart failed");
                }
            }
        }
    }

    async fn open_microphone(&mut self) -> Result<()> {
        self.restart_at = None;
        let res = self.backend.start_listening().await;
        self.publish_listening();
        if let Err(e) = &res {
            tracing::warn!(mode = %self.mode(), error = %e, "could not start listening");
            if e.is_terminal() && self.continuous {
                self.continuous = false;
            }
        }
        res
    }

    fn publish_listening(&self) {
        self.ctx.set_listening(self.is_listening());
    }

    fn silence_character(&self) {
        self.ctx.set_speaking(false);
        if let Some(hook) = &self.stop_speech {
            hook();
        }
    }

    fn schedule_restart(&mut self) {
        let state = self.ctx.read();
        if self.continuous && self.mode() == RecognitionMode::Browser && !state.chat_processing() {
            self.restart_at = Some(self.bctx.clock.now() + RESTART_DELAY);
        }
    }

    fn can_auto_listen(&self) -> bool {
        let state = self.ctx.read();
        self.mode() == RecognitionMode::Browser && !state.is_speaking && !state.chat_processing()
    }
}
