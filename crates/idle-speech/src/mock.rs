use crate::{ChatBackend, ChatMessage, Error, IdleUtterance, Result, SpeechSink};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

enum Reply {
    Chunks(Vec<String>),
    Fail(String),
}

/// Chat backend returning a canned reply, optionally after a delay.
pub struct MockChatBackend {
    reply: Reply,
    delay: Option<Duration>,
    calls: AtomicU32,
    last: Mutex<Vec<ChatMessage>>,
}

impl MockChatBackend {
    pub fn new() -> Self {
        Self {
            reply: Reply::Chunks(Vec::new()),
            delay: None,
            calls: AtomicU32::new(0),
            last: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.with_chunks([text.into()])
    }

    pub fn with_chunks(mut self, chunks: impl IntoIterator<Item = String>) -> Self {
        self.reply = Reply::Chunks(chunks.into_iter().collect());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.reply = Reply::Fail(message.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl Default for MockChatBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last.lock() {
            *last = messages.to_vec();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Reply::Chunks(chunks) => Ok(chunks.clone()),
            Reply::Fail(msg) => Err(Error::Backend(msg.clone())),
        }
    }
}

/// Speech sink that records what it was asked to say.
///
/// With a hold duration each `speak` call sleeps for that long, standing in
/// for audio playback.
#[derive(Default)]
pub struct RecordingSpeechSink {
    spoken: Mutex<Vec<(String, IdleUtterance)>>,
    stops: AtomicU32,
    hold: Option<Duration>,
}

impl RecordingSpeechSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn spoken(&self) -> Vec<IdleUtterance> {
        self.spoken
            .lock()
            .map(|s| s.iter().map(|(_, u)| u.clone()).collect())
            .unwrap_or_default()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.spoken
            .lock()
            .map(|s| s.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSink for RecordingSpeechSink {
    async fn speak(&self, session_id: &str, utterance: &IdleUtterance) -> Result<()> {
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push((session_id.to_string(), utterance.clone()));
        }
        if let Some(hold) = self.hold {
            tokio::time::sleep(hold).await;
        }
        Ok(())
    }

    fn stop_all(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
