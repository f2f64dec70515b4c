use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Presence of a visitor in front of the camera.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresenceState {
    #[default]
    Idle,
    Detected,
    Greeting,
    ConversationReady,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PresenceState::Idle => "idle",
            PresenceState::Detected => "detected",
            PresenceState::Greeting => "greeting",
            PresenceState::ConversationReady => "conversation-ready",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceErrorCode {
    CameraPermissionDenied,
    CameraNotAvailable,
    ModelLoadFailed,
}

/// Failure surfaced to the status indicator; orthogonal to [`PresenceState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceError {
    pub code: PresenceErrorCode,
    pub message: String,
}

impl PresenceError {
    pub fn new(code: PresenceErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for PresenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Snapshot of the state shared between the presence watcher, idle scheduler
/// and voice pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomeState {
    pub presence_state: PresenceState,
    pub presence_error: Option<PresenceError>,
    pub is_speaking: bool,
    /// A microphone session is open.
    pub is_listening: bool,
    pub chat_processing_count: u32,
    /// Bumped on every user input or user speech; idle speech watches it.
    pub user_activity_seq: u64,
    pub chat_log_len: usize,
}

impl HomeState {
    pub fn chat_processing(&self) -> bool {
        self.chat_processing_count > 0
    }
}

/// Cloneable handle to the shared home state.
///
/// Readers take snapshots or subscribe; writers mutate through closures so
/// every change is published to subscribers atomically.
#[derive(Debug, Clone)]
pub struct HomeContext {
    tx: Arc<watch::Sender<HomeState>>,
}

impl HomeContext {
    pub fn new() -> Self {
        Self::with_state(HomeState::default())
    }

    pub fn with_state(state: HomeState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx: Arc::new(tx) }
    }

    pub fn read(&self) -> HomeState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HomeState> {
        self.tx.subscribe()
    }

    /// Apply `f` and notify subscribers only when the state actually changed.
    pub fn write<F>(&self, f: F)
    where
        F: FnOnce(&mut HomeState),
    {
        self.tx.send_if_modified(|state| {
            let before = state.clone();
            f(state);
            *state != before
        });
    }

    pub fn user_activity_seq(&self) -> u64 {
        self.tx.borrow().user_activity_seq
    }

    /// Record typed input or recognized speech from the user.
    pub fn record_user_activity(&self) {
        self.write(|s| s.user_activity_seq = s.user_activity_seq.wrapping_add(1));
    }

    /// Append a message to the chat log; counts as user activity.
    pub fn push_chat_message(&self) {
        self.write(|s| {
            s.chat_log_len += 1;
            s.user_activity_seq = s.user_activity_seq.wrapping_add(1);
        });
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.write(|s| s.is_speaking = speaking);
    }

    pub fn set_listening(&self, listening: bool) {
        self.write(|s| s.is_listening = listening);
    }

    pub fn begin_chat_processing(&self) {
        self.write(|s| s.chat_processing_count += 1);
    }

    pub fn end_chat_processing(&self) {
        self.write(|s| s.chat_processing_count = s.chat_processing_count.saturating_sub(1));
    }

    pub fn set_presence(&self, presence: PresenceState) {
        self.write(|s| s.presence_state = presence);
    }

    pub fn set_presence_error(&self, error: Option<PresenceError>) {
        self.write(|s| s.presence_error = error);
    }
}

impl Default for HomeContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_publishes_to_subscribers() {
        let ctx = HomeContext::new();
        let mut rx = ctx.subscribe();
        assert!(!rx.has_changed().unwrap_or(true));

        ctx.record_user_activity();
        assert!(rx.has_changed().unwrap_or(false));
        assert_eq!(rx.borrow_and_update().user_activity_seq, 1);
    }

    #[test]
    fn test_noop_write_does_not_notify() {
        let ctx = HomeContext::new();
        let mut rx = ctx.subscribe();
        ctx.set_speaking(false);
        assert!(!rx.has_changed().unwrap_or(true));
        ctx.set_speaking(true);
        assert!(rx.has_changed().unwrap_or(false));
        assert!(rx.borrow_and_update().is_speaking);
    }

    #[test]
    fn test_listening_flag_is_not_activity() {
        let ctx = HomeContext::new();
        let mut rx = ctx.subscribe();
        ctx.set_listening(true);
        assert!(rx.has_changed().unwrap_or(false));
        let state = rx.borrow_and_update().clone();
        assert!(state.is_listening);
        assert_eq!(state.user_activity_seq, 0);
        ctx.set_listening(true);
        assert!(!rx.has_changed().unwrap_or(true));
    }

    #[test]
    fn test_chat_processing_counter_saturates() {
        let ctx = HomeContext::new();
        ctx.end_chat_processing();
        assert_eq!(ctx.read().chat_processing_count, 0);
        ctx.begin_chat_processing();
        ctx.begin_chat_processing();
        assert!(ctx.read().chat_processing());
        ctx.end_chat_processing();
        ctx.end_chat_processing();
        assert!(!ctx.read().chat_processing());
    }

    #[test]
    fn test_chat_message_counts_as_activity() {
        let ctx = HomeContext::new();
        ctx.push_chat_message();
        let state = ctx.read();
        assert_eq!(state.chat_log_len, 1);
        assert_eq!(state.user_activity_seq, 1);
    }

    #[test]
    fn test_presence_round_trips_through_store() {
        let ctx = HomeContext::new();
        ctx.set_presence(PresenceState::Greeting);
        ctx.set_presence_error(Some(PresenceError::new(
            PresenceErrorCode::ModelLoadFailed,
            "weights missing",
        )));
        let state = ctx.read();
        assert_eq!(state.presence_state, PresenceState::Greeting);
        assert_eq!(
            state.presence_error.map(|e| e.code),
            Some(PresenceErrorCode::ModelLoadFailed)
        );
    }
}
