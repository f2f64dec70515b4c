use crate::generate::generate_idle_phrase;
use crate::{
    ChatBackend, EmotionTagParser, IdleNotice, IdleState, IdleUtterance, PhraseSelector, Result,
    TickOutcome, TimePeriod,
};
use companion_context::{Clock, HomeContext, IdleModeSettings, PresenceState};
use std::sync::Arc;
use std::time::Duration;

type NoticeCallback = Box<dyn Fn(&IdleNotice) + Send + Sync>;

/// Decides when the character speaks on its own and what it says.
///
/// The scheduler is polled: callers invoke [`IdleScheduler::tick`] roughly
/// once a second and play whatever it emits. Time is read from the injected
/// [`Clock`].
pub struct IdleScheduler {
    settings: IdleModeSettings,
    ctx: HomeContext,
    clock: Arc<dyn Clock>,
    chat: Option<Arc<dyn ChatBackend>>,
    parser: EmotionTagParser,
    selector: PhraseSelector,
    state: IdleState,
    next_speech_at: Option<Duration>,
    session_id: Option<String>,
    on_notice: Option<NoticeCallback>,
}

impl IdleScheduler {
    pub fn new(settings: IdleModeSettings, ctx: HomeContext, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut scheduler = Self {
            settings,
            ctx,
            clock,
            chat: None,
            parser: EmotionTagParser::new()?,
            selector: PhraseSelector::new(),
            state: IdleState::Disabled,
            next_speech_at: None,
            session_id: None,
            on_notice: None,
        };
        let enabled = scheduler.settings.enabled;
        scheduler.set_enabled(enabled);
        Ok(scheduler)
    }

    pub fn with_chat_backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.chat = Some(backend);
        self
    }

    pub fn with_selector(mut self, selector: PhraseSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn set_notice_callback<F>(&mut self, callback: F)
    where
        F: Fn(&IdleNotice) + Send + Sync + 'static,
    {
        self.on_notice = Some(Box::new(callback));
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.settings.enabled && self.state != IdleState::Disabled
    }

    pub fn settings(&self) -> &IdleModeSettings {
        &self.settings
    }

    pub fn context(&self) -> &HomeContext {
        &self.ctx
    }

    /// Session id of the utterance currently being spoken, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whole seconds until the next attempt, rounded up. Zero when disabled
    /// or already due.
    pub fn seconds_until_next_speech(&self) -> u64 {
        let Some(at) = self.next_speech_at else {
            return 0;
        };
        let remaining = at.saturating_sub(self.clock.now());
        let secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
        if enabled {
            if self.state == IdleState::Disabled {
                self.state = IdleState::Waiting;
            }
            self.reset_timer();
            tracing::info!(interval_secs = self.settings.interval_secs, "idle mode enabled");
        } else {
            self.state = IdleState::Disabled;
            self.next_speech_at = None;
            self.session_id = None;
            tracing::info!("idle mode disabled");
        }
    }

    /// Swap in new settings. The phrase cursor restarts and the countdown is
    /// re-armed with the new interval.
    pub fn update_settings(&mut self, settings: IdleModeSettings) {
        let enabled = settings.enabled;
        self.settings = settings;
        self.selector.reset();
        self.set_enabled(enabled);
    }

    pub fn reset_timer(&mut self) {
        if self.state == IdleState::Disabled {
            return;
        }
        self.next_speech_at = Some(self.clock.now() + self.settings.interval());
    }

    /// No chat in flight, nothing being spoken, the microphone closed and
    /// nobody in front of the camera.
    pub fn can_speak(&self) -> bool {
        let hs = self.ctx.read();
        !hs.chat_processing()
            && !hs.is_speaking
            && !hs.is_listening
            && hs.presence_state == PresenceState::Idle
    }

    pub async fn tick(&mut self) -> TickOutcome {
        if self.state != IdleState::Waiting {
            return TickOutcome::Noop;
        }
        let Some(at) = self.next_speech_at else {
            return TickOutcome::Noop;
        };
        let now = self.clock.now();
        if now < at {
            return TickOutcome::Noop;
        }
        self.next_speech_at = Some(now + self.settings.interval());

        if !self.can_speak() {
            tracing::debug!("idle speech skipped: character busy or visitor present");
            return TickOutcome::Noop;
        }

        let Some(utterance) = self.select_utterance().await else {
            return TickOutcome::Noop;
        };

        self.state = IdleState::Speaking;
        self.session_id = Some(format!("idle-{}", uuid::Uuid::new_v4()));
        tracing::info!(text = %utterance.text, emotion = %utterance.emotion, "idle speech");
        self.notify(&IdleNotice::SpeechStarted(utterance.clone()));
        TickOutcome::EmitPhrase(utterance)
    }

    /// Cancel the current idle utterance in response to user activity. The
    /// countdown restarts either way; returns whether speech was interrupted.
    pub fn interrupt(&mut self) -> bool {
        self.reset_timer();
        if self.state != IdleState::Speaking {
            return false;
        }
        self.state = IdleState::Waiting;
        self.session_id = None;
        tracing::info!("idle speech interrupted");
        self.notify(&IdleNotice::SpeechInterrupted);
        true
    }

    pub fn speech_completed(&mut self) {
        if self.state != IdleState::Speaking {
            return;
        }
        self.state = IdleState::Waiting;
        self.session_id = None;
        self.reset_timer();
        self.notify(&IdleNotice::SpeechCompleted);
    }

    async fn select_utterance(&mut self) -> Option<IdleUtterance> {
        if let Some(greeting) = self.time_period_greeting() {
            return Some(greeting);
        }
        if self.settings.ai_generation_enabled {
            return self.generate().await;
        }
        self.selector
            .next(&self.settings.phrases, self.settings.playback_mode)
    }

    fn time_period_greeting(&self) -> Option<IdleUtterance> {
        let tp = &self.settings.time_period;
        if !tp.enabled {
            return None;
        }
        let text = match TimePeriod::from_hour(self.clock.local_hour()) {
            TimePeriod::Morning => &tp.morning,
            TimePeriod::Afternoon => &tp.afternoon,
            TimePeriod::Evening => &tp.evening,
        };
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(IdleUtterance::new(text, self.settings.default_emotion))
    }

    async fn generate(&mut self) -> Option<IdleUtterance> {
        let Some(backend) = self.chat.clone() else {
            tracing::warn!("ai idle generation enabled but no chat backend configured");
            return None;
        };

        let seq_before = self.ctx.user_activity_seq();
        let mut activity = self.ctx.subscribe();
        let template = self.settings.ai_prompt_template.clone();

        let result = tokio::select! {
            res = generate_idle_phrase(backend.as_ref(), &self.parser, &template) => res,
            _ = wait_for_activity(&mut activity, seq_before) => {
                tracing::info!("user activity during idle generation; request dropped");
                return None;
            }
        };

        if self.ctx.user_activity_seq() != seq_before {
            tracing::debug!("discarding idle generation result after user activity");
            return None;
        }

        match result {
            Ok(utterance) => utterance,
            Err(e) => {
                tracing::warn!(error = %e, "idle phrase generation failed");
                None
            }
        }
    }

    fn notify(&self, notice: &IdleNotice) {
        if let Some(cb) = &self.on_notice {
            cb(notice);
        }
    }
}

async fn wait_for_activity(
    rx: &mut tokio::sync::watch::Receiver<companion_context::HomeState>,
    seq_before: u64,
) {
    loop {
        if rx.changed().await.is_err() {
            // sender gone: nothing can ever signal activity
            std::future::pending::<()>().await;
        }
        if rx.borrow_and_update().user_activity_seq != seq_before {
            return;
        }
    }
}
