use companion_context::{Clock, VoiceSettings};
use std::sync::Arc;
use std::time::Duration;

/// Decision from a [`SilenceDetector`] check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SilenceAction {
    Continue,
    /// Silence after speech; send this transcript and stop.
    AutoSend(String),
    /// Nothing was said before the initial speech timeout; stop listening.
    AutoStop,
    /// Speech was heard and has gone quiet, but there is no transcript yet.
    SpeechEnded,
}

/// Tracks silence during one listening session.
///
/// Two timeouts apply, both measured from the last sign of speech: the
/// initial speech timeout while nothing has been recognized yet, and the
/// no-speech timeout once a transcript exists. A zero timeout is disabled.
/// After an auto action fires the detector stays quiet until restarted.
pub struct SilenceDetector {
    clock: Arc<dyn Clock>,
    no_speech_timeout: Duration,
    initial_speech_timeout: Duration,
    running: bool,
    last_speech_at: Duration,
    speech_detected: bool,
    ended: bool,
    transcript_len: usize,
}

impl SilenceDetector {
    pub fn new(settings: &VoiceSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            no_speech_timeout: settings.no_speech_timeout(),
            initial_speech_timeout: settings.initial_speech_timeout(),
            running: false,
            last_speech_at: Duration::ZERO,
            speech_detected: false,
            ended: false,
            transcript_len: 0,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.last_speech_at = self.clock.now();
        self.speech_detected = false;
        self.ended = false;
        self.transcript_len = 0;
    }

    pub fn clear(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// True once an auto action fired for this session.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn speech_detected(&self) -> bool {
        self.speech_detected
    }

    /// Sound started; pushes the silence window out without counting as
    /// recognized speech.
    pub fn on_speech_start(&mut self) {
        self.last_speech_at = self.clock.now();
    }

    /// Audio-level voice activity from a recorder.
    pub fn on_voice_activity(&mut self) {
        self.last_speech_at = self.clock.now();
        self.speech_detected = true;
    }

    /// A transcript update. Only growth counts as speech; unchanged text is
    /// background noise.
    pub fn on_transcript(&mut self, transcript: &str) {
        let len = transcript.trim().chars().count();
        if len > self.transcript_len {
            self.last_speech_at = self.clock.now();
            self.speech_detected = true;
        }
        self.transcript_len = len;
    }

    fn silence(&self) -> Duration {
        self.clock.now().saturating_sub(self.last_speech_at)
    }

    fn initial_expired(&self) -> bool {
        !self.initial_speech_timeout.is_zero()
            && !self.speech_detected
            && self.silence() >= self.initial_speech_timeout
    }

    fn no_speech_expired(&self) -> bool {
        !self.no_speech_timeout.is_zero() && self.silence() >= self.no_speech_timeout
    }

    pub fn check(&mut self, transcript: &str) -> SilenceAction {
        if !self.running || self.ended {
            return SilenceAction::Continue;
        }
        if self.initial_expired() {
            self.ended = true;
            return SilenceAction::AutoStop;
        }
        if self.no_speech_expired() {
            let text = transcript.trim();
            if !text.is_empty() {
                self.ended = true;
                return SilenceAction::AutoSend(text.to_string());
            }
        }
        SilenceAction::Continue
    }

    /// Variant for recorders that only learn the transcript after stopping.
    pub fn check_audio(&mut self) -> SilenceAction {
        if !self.running || self.ended {
            return SilenceAction::Continue;
        }
        if self.initial_expired() {
            self.ended = true;
            return SilenceAction::AutoStop;
        }
        if self.speech_detected && self.no_speech_expired() {
            self.ended = true;
            return SilenceAction::SpeechEnded;
        }
        SilenceAction::Continue
    }

    /// Time left before auto-send, shown only after speech with text.
    pub fn remaining(&self, transcript: &str) -> Option<Duration> {
        if !self.running
            || self.ended
            || !self.speech_detected
            || self.no_speech_timeout.is_zero()
            || transcript.trim().is_empty()
        {
            return None;
        }
        Some(self.no_speech_timeout.saturating_sub(self.silence()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_context::ManualClock;

    fn detector(no_speech: f64, initial: f64) -> (SilenceDetector, ManualClock) {
        let clock = ManualClock::new();
        let settings = VoiceSettings {
            no_speech_timeout_secs: no_speech,
            initial_speech_timeout_secs: initial,
            ..VoiceSettings::default()
        };
        let mut det = SilenceDetector::new(&settings, Arc::new(clock.clone()));
        det.start();
        (det, clock)
    }

    #[test]
    fn test_auto_send_after_silence_with_text() {
        let (mut det, clock) = detector(2.0, 5.0);
        clock.advance_secs(1);
        det.on_transcript("hello");
        clock.advance(Duration::from_millis(1900));
        assert_eq!(det.check("hello"), SilenceAction::Continue);
        clock.advance(Duration::from_millis(100));
        assert_eq!(det.check(" hello "), SilenceAction::AutoSend("hello".into()));
        assert!(det.is_ended());
        assert_eq!(det.check("hello"), SilenceAction::Continue);
    }

    #[test]
    fn test_auto_stop_on_initial_silence() {
        let (mut det, clock) = detector(2.0, 5.0);
        clock.advance_secs(2);
        // no transcript yet, so the no-speech timeout cannot send anything
        assert_eq!(det.check(""), SilenceAction::Continue);
        clock.advance_secs(3);
        assert_eq!(det.check(""), SilenceAction::AutoStop);
    }

    #[test]
    fn test_speech_start_extends_initial_window() {
        let (mut det, clock) = detector(0.0, 5.0);
        clock.advance_secs(4);
        det.on_speech_start();
        clock.advance_secs(4);
        assert_eq!(det.check(""), SilenceAction::Continue);
        clock.advance_secs(1);
        assert_eq!(det.check(""), SilenceAction::AutoStop);
    }

    #[test]
    fn test_unchanged_transcript_is_noise() {
        let (mut det, clock) = detector(2.0, 0.0);
        det.on_transcript("hi");
        clock.advance_secs(1);
        det.on_transcript("hi");
        clock.advance_secs(1);
        assert_eq!(det.check("hi"), SilenceAction::AutoSend("hi".into()));
    }

    #[test]
    fn test_zero_timeouts_disable() {
        let (mut det, clock) = detector(0.0, 0.0);
        det.on_transcript("words");
        clock.advance_secs(600);
        assert_eq!(det.check("words"), SilenceAction::Continue);
        assert_eq!(det.remaining("words"), None);
    }

    #[test]
    fn test_remaining_only_after_speech_with_text() {
        let (mut det, clock) = detector(5.0, 10.0);
        assert_eq!(det.remaining(""), None);
        clock.advance_secs(1);
        det.on_speech_start();
        assert_eq!(det.remaining(""), None);
        det.on_transcript("hey");
        clock.advance_secs(2);
        assert_eq!(det.remaining("hey"), Some(Duration::from_secs(3)));
        det.clear();
        assert_eq!(det.remaining("hey"), None);
    }

    #[test]
    fn test_audio_only_speech_end() {
        let (mut det, clock) = detector(1.5, 5.0);
        clock.advance_secs(1);
        det.on_voice_activity();
        clock.advance_secs(1);
        assert_eq!(det.check_audio(), SilenceAction::Continue);
        clock.advance(Duration::from_millis(500));
        assert_eq!(det.check_audio(), SilenceAction::SpeechEnded);
    }
}
