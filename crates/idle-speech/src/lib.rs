//! idle-speech: unprompted character speech after a period of user inactivity
//!
//! [`IdleScheduler`] owns the countdown and phrase selection, [`IdleDriver`]
//! runs it on a one-second cadence and hands emitted lines to a
//! [`SpeechSink`]. Lines come from the user's phrase list, time-of-day
//! greetings, or a [`ChatBackend`] when AI generation is enabled.

mod types;
pub use types::{ChatMessage, ChatRole, IdleNotice, IdleState, IdleUtterance, TickOutcome, TimePeriod};

mod error;
pub use error::{Error, Result};

mod traits;
pub use traits::{ChatBackend, SpeechSink};

mod selector;
pub use selector::PhraseSelector;

pub mod generate;
pub use generate::{generate_idle_phrase, EmotionTagParser, THINKING_MARKER};

mod scheduler;
pub use scheduler::IdleScheduler;

mod driver;
pub use driver::IdleDriver;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "http")]
pub mod http;

pub use companion_context::{
    clamp_idle_interval, IdleModeSettings, IdlePhrase, IdlePlaybackMode, IDLE_INTERVAL_MAX,
    IDLE_INTERVAL_MIN,
};
