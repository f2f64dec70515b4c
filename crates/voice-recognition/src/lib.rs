//! voice-recognition: one listening facade over interchangeable recognition back-ends

mod types;
pub use types::{
    BackendEvent, SessionSnapshot, StreamEvent, UserUtterance, UtteranceSource, VoiceStatus,
};

mod error;
pub use error::{Result, VoiceError};

mod traits;
pub use traits::{AudioCapture, ProviderFactory, RealtimeLink, RecognitionBackend, SpeechStream, Transcriber};

mod outbox;
pub use outbox::UtteranceOutbox;

mod silence;
pub use silence::{SilenceAction, SilenceDetector};

mod browser;
pub use browser::BrowserBackend;

mod whisper;
pub use whisper::WhisperBackend;

mod realtime;
pub use realtime::RealtimeBackend;

pub mod plugin;
pub use plugin::{new_recognition_backend, BackendContext};

mod dispatcher;
pub use dispatcher::VoiceRecognitionDispatcher;

mod handle;
pub use handle::{spawn_voice_actor, VoiceHandle};

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "audio")]
pub mod mic;

#[cfg(feature = "whisper_http")]
pub mod whisper_http;

pub use companion_context::{RecognitionMode, VoiceSettings};
