//! companion-context: shared clock, home-state store and settings for the companion core

mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

mod emotion;
pub use emotion::Emotion;

mod error;
pub use error::{Error, Result};

mod store;
pub use store::{HomeContext, HomeState, PresenceError, PresenceErrorCode, PresenceState};

pub mod settings;
pub use settings::{
    clamp_idle_interval, load_settings_file, ChatEndpointSettings, CompanionSettings,
    DetectionSensitivity, IdleModeSettings, IdlePhrase, IdlePlaybackMode, PresenceSettings,
    RecognitionMode, TimePeriodGreetings, VoiceSettings, IDLE_INTERVAL_MAX, IDLE_INTERVAL_MIN,
};
