//! Persisted companion settings.
//!
//! Every field carries a serde default so a partial YAML file loads; call
//! [`CompanionSettings::validate`] after loading to normalize out-of-range
//! values.

use crate::{Emotion, Error};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const IDLE_INTERVAL_MIN: u32 = 10;
pub const IDLE_INTERVAL_MAX: u32 = 300;

/// Clamp an idle interval (seconds) into `[10, 300]`.
pub fn clamp_idle_interval(secs: u32) -> u32 {
    secs.clamp(IDLE_INTERVAL_MIN, IDLE_INTERVAL_MAX)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionSettings {
    pub presence: PresenceSettings,
    pub idle: IdleModeSettings,
    pub voice: VoiceSettings,
    pub chat: Option<ChatEndpointSettings>,
}

impl CompanionSettings {
    /// Normalize out-of-range values in place, returning a warning per fix.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        let clamped = clamp_idle_interval(self.idle.interval_secs);
        if clamped != self.idle.interval_secs {
            warnings.push(format!(
                "idle.interval_secs {} clamped to {}",
                self.idle.interval_secs, clamped
            ));
            self.idle.interval_secs = clamped;
        }

        if self.idle.ai_generation_enabled && self.idle.ai_prompt_template.trim().is_empty() {
            warnings.push("idle.ai_generation_enabled set without a prompt template".to_string());
        }

        if !(0.0..=1.0).contains(&self.presence.confidence_threshold) {
            let fixed = self.presence.confidence_threshold.clamp(0.0, 1.0);
            warnings.push(format!(
                "presence.confidence_threshold {} clamped to {}",
                self.presence.confidence_threshold, fixed
            ));
            self.presence.confidence_threshold = fixed;
        }

        for (name, value) in [
            ("presence.greeting_delay_secs", &mut self.presence.greeting_delay_secs),
            ("presence.departure_timeout_secs", &mut self.presence.departure_timeout_secs),
            ("presence.cooldown_secs", &mut self.presence.cooldown_secs),
            ("voice.no_speech_timeout_secs", &mut self.voice.no_speech_timeout_secs),
            ("voice.initial_speech_timeout_secs", &mut self.voice.initial_speech_timeout_secs),
        ] {
            if !value.is_finite() || *value < 0.0 {
                warnings.push(format!("{name} {value} reset to 0"));
                *value = 0.0;
            }
        }

        for w in &warnings {
            tracing::warn!("settings: {}", w);
        }
        warnings
    }
}

/// Load and normalize a YAML settings file.
pub fn load_settings_file(path: impl AsRef<Path>) -> anyhow::Result<CompanionSettings> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading settings: {}", path.display()))?;
    let mut settings: CompanionSettings = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing settings yaml: {}", path.display()))?;
    settings.validate();
    Ok(settings)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl DetectionSensitivity {
    /// Face-detection poll interval for this sensitivity.
    pub fn poll_interval(&self) -> Duration {
        match self {
            DetectionSensitivity::Low => Duration::from_millis(500),
            DetectionSensitivity::Medium => Duration::from_millis(300),
            DetectionSensitivity::High => Duration::from_millis(150),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    pub enabled: bool,
    pub greeting_message: String,
    /// Face must stay in view this long before the greeting starts.
    pub greeting_delay_secs: f64,
    pub departure_timeout_secs: f64,
    pub cooldown_secs: f64,
    pub confidence_threshold: f32,
    pub sensitivity: DetectionSensitivity,
    pub debug: bool,
}

impl PresenceSettings {
    pub fn greeting_delay(&self) -> Duration {
        secs_to_duration(self.greeting_delay_secs)
    }

    pub fn departure_timeout(&self) -> Duration {
        secs_to_duration(self.departure_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        secs_to_duration(self.cooldown_secs)
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            greeting_message: "Welcome! Is there anything I can help you with?".to_string(),
            greeting_delay_secs: 1.0,
            departure_timeout_secs: 3.0,
            cooldown_secs: 5.0,
            confidence_threshold: 0.5,
            sensitivity: DetectionSensitivity::Medium,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdlePlaybackMode {
    #[default]
    Sequential,
    Random,
}

/// A single user-authored idle line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdlePhrase {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub emotion: Emotion,
    #[serde(default)]
    pub order: i32,
}

impl IdlePhrase {
    pub fn new(text: impl Into<String>, emotion: Emotion, order: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            emotion,
            order,
        }
    }
}

/// Fixed lines for the morning, afternoon and evening windows, spoken with
/// the idle default emotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimePeriodGreetings {
    pub enabled: bool,
    pub morning: String,
    pub afternoon: String,
    pub evening: String,
}

impl Default for TimePeriodGreetings {
    fn default() -> Self {
        Self {
            enabled: false,
            morning: "Good morning!".to_string(),
            afternoon: "Hello!".to_string(),
            evening: "Good evening!".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleModeSettings {
    pub enabled: bool,
    pub phrases: Vec<IdlePhrase>,
    pub playback_mode: IdlePlaybackMode,
    pub interval_secs: u32,
    /// Expression for time-of-day greetings.
    pub default_emotion: Emotion,
    pub time_period: TimePeriodGreetings,
    pub ai_generation_enabled: bool,
    pub ai_prompt_template: String,
}

impl IdleModeSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(clamp_idle_interval(self.interval_secs)))
    }
}

impl Default for IdleModeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            phrases: Vec::new(),
            playback_mode: IdlePlaybackMode::Sequential,
            interval_secs: 30,
            default_emotion: Emotion::Neutral,
            time_period: TimePeriodGreetings::default(),
            ai_generation_enabled: false,
            ai_prompt_template: String::new(),
        }
    }
}

/// Listening back-end selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionMode {
    #[default]
    Browser,
    Whisper,
    Realtime,
}

impl RecognitionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionMode::Browser => "browser",
            RecognitionMode::Whisper => "whisper",
            RecognitionMode::Realtime => "realtime",
        }
    }
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecognitionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "browser" => Ok(RecognitionMode::Browser),
            "whisper" => Ok(RecognitionMode::Whisper),
            "realtime" => Ok(RecognitionMode::Realtime),
            other => Err(Error::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub recognition_mode: RecognitionMode,
    /// Seconds of silence after speech before the transcript is auto-sent; 0 disables.
    pub no_speech_timeout_secs: f64,
    /// Seconds without any speech before listening stops; 0 disables.
    pub initial_speech_timeout_secs: f64,
    pub continuous_mic_listening: bool,
    pub language: Option<String>,
}

impl VoiceSettings {
    pub fn no_speech_timeout(&self) -> Duration {
        secs_to_duration(self.no_speech_timeout_secs)
    }

    pub fn initial_speech_timeout(&self) -> Duration {
        secs_to_duration(self.initial_speech_timeout_secs)
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            recognition_mode: RecognitionMode::Browser,
            no_speech_timeout_secs: 5.0,
            initial_speech_timeout_secs: 5.0,
            continuous_mic_listening: false,
            language: None,
        }
    }
}

/// OpenAI-compatible chat completion endpoint used for idle line generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEndpointSettings {
    pub url: String,
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_clamp_idle_interval() {
        assert_eq!(clamp_idle_interval(5), 10);
        assert_eq!(clamp_idle_interval(301), 300);
        assert_eq!(clamp_idle_interval(42), 42);
        assert_eq!(clamp_idle_interval(10), 10);
        assert_eq!(clamp_idle_interval(300), 300);
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let s = CompanionSettings::default();
        assert!(!s.idle.enabled);
        assert_eq!(s.idle.interval_secs, 30);
        assert_eq!(s.idle.playback_mode, IdlePlaybackMode::Sequential);
        assert_eq!(s.presence.departure_timeout_secs, 3.0);
        assert_eq!(s.presence.cooldown_secs, 5.0);
        assert_eq!(s.presence.sensitivity, DetectionSensitivity::Medium);
        assert_eq!(s.voice.recognition_mode, RecognitionMode::Browser);
        assert_eq!(s.voice.no_speech_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_sensitivity_intervals() {
        assert_eq!(DetectionSensitivity::Low.poll_interval(), Duration::from_millis(500));
        assert_eq!(DetectionSensitivity::Medium.poll_interval(), Duration::from_millis(300));
        assert_eq!(DetectionSensitivity::High.poll_interval(), Duration::from_millis(150));
    }

    #[test]
    fn test_validate_normalizes_values() {
        let mut s = CompanionSettings::default();
        s.idle.interval_secs = 1000;
        s.presence.confidence_threshold = 1.7;
        s.voice.no_speech_timeout_secs = -2.0;
        let warnings = s.validate();
        assert_eq!(warnings.len(), 3);
        assert_eq!(s.idle.interval_secs, 300);
        assert_eq!(s.presence.confidence_threshold, 1.0);
        assert_eq!(s.voice.no_speech_timeout_secs, 0.0);
    }

    #[test]
    fn test_recognition_mode_from_str() {
        assert_eq!("Whisper".parse::<RecognitionMode>().unwrap(), RecognitionMode::Whisper);
        assert!("carrier-pigeon".parse::<RecognitionMode>().is_err());
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
idle:
  enabled: true
  interval_secs: 5
  playback_mode: random
  phrases:
    - id: a
      text: "Anyone there?"
      emotion: happy
      order: 0
voice:
  recognition_mode: realtime
"#
        )
        .unwrap();

        let s = load_settings_file(file.path()).unwrap();
        assert!(s.idle.enabled);
        assert_eq!(s.idle.interval_secs, 10);
        assert_eq!(s.idle.playback_mode, IdlePlaybackMode::Random);
        assert_eq!(s.idle.phrases[0].emotion, Emotion::Happy);
        assert_eq!(s.voice.recognition_mode, RecognitionMode::Realtime);
        assert_eq!(s.presence, PresenceSettings::default());
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = load_settings_file("/nonexistent/companion.yaml").unwrap_err();
        assert!(err.to_string().contains("reading settings"));
    }

    #[test]
    fn test_idle_phrase_ids_are_unique() {
        let a = IdlePhrase::new("a", Emotion::Neutral, 0);
        let b = IdlePhrase::new("a", Emotion::Neutral, 0);
        assert_ne!(a.id, b.id);
    }
}
