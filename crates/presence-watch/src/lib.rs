//! presence-watch: camera-driven visitor presence state machine
//!
//! The [`PresenceWatcher`] turns a stream of face-detection results into the
//! four-state presence machine (`idle → detected → greeting →
//! conversation-ready → idle`) and mirrors it into the shared
//! [`companion_context::HomeContext`]. [`PresenceMonitor`] drives a
//! [`FaceDetector`] at the configured poll interval.

mod types;
pub use types::{BoundingBox, DetectionResult, PresenceEvent};

mod error;
pub use error::{Error, Result};

mod traits;
pub use traits::FaceDetector;

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::{ScriptedDetector, ScriptedFailure};

mod watcher;
pub use watcher::PresenceWatcher;

mod monitor;
pub use monitor::{PresenceCommand, PresenceMonitor};

pub use companion_context::{PresenceError, PresenceErrorCode, PresenceState};
