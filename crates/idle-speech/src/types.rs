use companion_context::Emotion;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    Disabled,
    Waiting,
    Speaking,
}

/// A line the character should say, with its expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleUtterance {
    pub text: String,
    pub emotion: Emotion,
}

impl IdleUtterance {
    pub fn new(text: impl Into<String>, emotion: Emotion) -> Self {
        Self {
            text: text.into(),
            emotion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    EmitPhrase(IdleUtterance),
    Noop,
}

/// Lifecycle notifications for idle indicators and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleNotice {
    SpeechStarted(IdleUtterance),
    SpeechCompleted,
    SpeechInterrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePeriod {
    Morning,
    Afternoon,
    Evening,
}

impl TimePeriod {
    /// 05:00-10:59 morning, 11:00-16:59 afternoon, evening otherwise.
    pub fn from_hour(hour: u8) -> Self {
        match hour {
            5..=10 => TimePeriod::Morning,
            11..=16 => TimePeriod::Afternoon,
            _ => TimePeriod::Evening,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}
