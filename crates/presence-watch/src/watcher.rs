use crate::{DetectionResult, Error, FaceDetector, PresenceEvent, Result};
use companion_context::{Clock, HomeContext, PresenceError, PresenceSettings, PresenceState};
use std::sync::Arc;
use std::time::Duration;

/// Presence state machine.
///
/// A face only counts when `face_detected` is set and its confidence meets the
/// configured threshold; everything else is treated as absence. Absence
/// shorter than the departure timeout is tolerated, so a flickering detector
/// neither restarts the greeting window nor triggers a departure.
pub struct PresenceWatcher {
    settings: PresenceSettings,
    ctx: HomeContext,
    clock: Arc<dyn Clock>,
    state: PresenceState,
    error: Option<PresenceError>,
    detecting: bool,
    first_seen: Option<Duration>,
    last_seen: Option<Duration>,
    cooldown_until: Option<Duration>,
    last_result: Option<DetectionResult>,
}

impl PresenceWatcher {
    pub fn new(settings: PresenceSettings, ctx: HomeContext, clock: Arc<dyn Clock>) -> Self {
        ctx.set_presence(PresenceState::Idle);
        Self {
            settings,
            ctx,
            clock,
            state: PresenceState::Idle,
            error: None,
            detecting: false,
            first_seen: None,
            last_seen: None,
            cooldown_until: None,
            last_result: None,
        }
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    pub fn error(&self) -> Option<&PresenceError> {
        self.error.as_ref()
    }

    pub fn is_detecting(&self) -> bool {
        self.detecting
    }

    pub fn last_result(&self) -> Option<&DetectionResult> {
        self.last_result.as_ref()
    }

    pub fn settings(&self) -> &PresenceSettings {
        &self.settings
    }

    pub fn in_cooldown(&self) -> bool {
        matches!(self.cooldown_until, Some(until) if self.clock.now() < until)
    }

    /// Load the model and open the camera. A failure is recorded as a
    /// [`PresenceError`] and stays until the next explicit `start`.
    pub async fn start<D>(&mut self, detector: &mut D) -> Result<()>
    where
        D: FaceDetector + ?Sized,
    {
        if self.detecting {
            return Ok(());
        }
        self.clear_error();

        if let Err(e) = detector.load_model().await {
            self.report_failure(&e);
            return Err(e);
        }
        if let Err(e) = detector.open_camera().await {
            self.report_failure(&e);
            return Err(e);
        }

        self.detecting = true;
        tracing::info!(
            "presence detection started ({:?} poll interval)",
            self.settings.sensitivity.poll_interval()
        );
        Ok(())
    }

    /// Release the camera and return to idle.
    pub fn stop<D>(&mut self, detector: &mut D)
    where
        D: FaceDetector + ?Sized,
    {
        detector.release();
        self.detecting = false;
        self.transition(PresenceState::Idle);
        self.first_seen = None;
        self.last_seen = None;
        self.cooldown_until = None;
        self.last_result = None;
        tracing::info!("presence detection stopped");
    }

    /// Record a detector failure. Terminal failures stop detection; the
    /// presence state itself is left untouched.
    pub fn report_failure(&mut self, err: &Error) {
        match err.presence_error() {
            Some(presence_error) => {
                tracing::warn!("presence detection failed: {}", err);
                self.detecting = false;
                self.ctx.set_presence_error(Some(presence_error.clone()));
                self.error = Some(presence_error);
            }
            None => self.log(format_args!("detection error: {err}")),
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
        self.ctx.set_presence_error(None);
    }

    /// Feed one detection frame through the state machine.
    pub fn observe(&mut self, result: &DetectionResult) -> Vec<PresenceEvent> {
        let now = self.clock.now();
        let mut events = Vec::new();
        self.last_result = Some(result.clone());

        if let Some(until) = self.cooldown_until {
            if now >= until {
                self.cooldown_until = None;
                self.log(format_args!("cooldown ended"));
            }
        }

        let present =
            result.face_detected && result.confidence >= self.settings.confidence_threshold;

        if present {
            self.last_seen = Some(now);
            match self.state {
                PresenceState::Idle => {
                    if self.cooldown_until.is_some() {
                        self.log(format_args!("face ignored during cooldown"));
                        return events;
                    }
                    self.log(format_args!("face detected ({:.2})", result.confidence));
                    self.first_seen = Some(now);
                    events.push(PresenceEvent::PersonDetected);
                    self.transition(PresenceState::Detected);
                    self.maybe_greet(now, &mut events);
                }
                PresenceState::Detected => self.maybe_greet(now, &mut events),
                PresenceState::Greeting | PresenceState::ConversationReady => {}
            }
        } else if self.state != PresenceState::Idle {
            let gone_for = self
                .last_seen
                .map(|seen| now.saturating_sub(seen))
                .unwrap_or(Duration::MAX);
            if gone_for >= self.settings.departure_timeout() {
                self.depart(now, &mut events);
            }
        }

        events
    }

    /// Mark the greeting speech as finished.
    pub fn complete_greeting(&mut self) -> Option<PresenceEvent> {
        if self.state != PresenceState::Greeting {
            return None;
        }
        self.transition(PresenceState::ConversationReady);
        self.log(format_args!("greeting completed"));
        Some(PresenceEvent::GreetingComplete)
    }

    fn maybe_greet(&mut self, now: Duration, events: &mut Vec<PresenceEvent>) {
        let Some(first) = self.first_seen else {
            return;
        };
        if now.saturating_sub(first) >= self.settings.greeting_delay() {
            self.transition(PresenceState::Greeting);
            events.push(PresenceEvent::GreetingStart(
                self.settings.greeting_message.clone(),
            ));
        }
    }

    fn depart(&mut self, now: Duration, events: &mut Vec<PresenceEvent>) {
        self.log(format_args!("person departed"));
        if self.state == PresenceState::Greeting {
            events.push(PresenceEvent::InterruptGreeting);
        }
        events.push(PresenceEvent::PersonDeparted);
        self.transition(PresenceState::Idle);
        self.first_seen = None;
        self.last_seen = None;

        let cooldown = self.settings.cooldown();
        if !cooldown.is_zero() {
            self.cooldown_until = Some(now + cooldown);
        }
    }

    fn transition(&mut self, next: PresenceState) {
        if self.state != next {
            self.log(format_args!("state transition: {} -> {}", self.state, next));
            self.state = next;
            self.ctx.set_presence(next);
        }
    }

    fn log(&self, msg: std::fmt::Arguments<'_>) {
        if self.settings.debug {
            tracing::info!("[presence] {}", msg);
        } else {
            tracing::debug!("[presence] {}", msg);
        }
    }
}
