//! AI-generated idle lines.
//!
//! Only the user's idle prompt template is sent as the system prompt; the
//! character persona is deliberately left out so idle chatter stays short and
//! generic.

use crate::{ChatBackend, ChatMessage, IdleUtterance, Result};
use companion_context::Emotion;
use regex::Regex;

/// Chunks starting with this marker carry model reasoning and are not spoken.
pub const THINKING_MARKER: &str = "[[thinking]]";

const IDLE_AI_SYSTEM_PROMPT_SUFFIX: &str = "

There are six emotions: neutral, happy, angry, sad, relaxed and surprised.
Reply in the following format:
[{emotion}]{line}

Example: [happy]Hello! How are you doing?

Reply with exactly one line.";

const IDLE_AI_USER_PROMPT: &str = "Generate one line.";

/// Splits a leading `[emotion]` tag from generated text.
pub struct EmotionTagParser {
    leading_tag: Regex,
    any_tag: Regex,
}

impl EmotionTagParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            leading_tag: Regex::new(r"^\s*\[(.*?)\]")?,
            any_tag: Regex::new(r"\[.*?\]")?,
        })
    }

    /// `"[happy]Hi!"` becomes `Hi!` with `Happy`. Unknown tags fall back to
    /// neutral, tags elsewhere in the text are stripped, and `None` is
    /// returned when no speakable text remains.
    pub fn parse(&self, raw: &str) -> Option<IdleUtterance> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let (emotion, body) = match self.leading_tag.captures(raw) {
            Some(caps) => {
                let emotion = caps
                    .get(1)
                    .and_then(|m| Emotion::parse(m.as_str()))
                    .unwrap_or(Emotion::Neutral);
                let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
                (emotion, &raw[end..])
            }
            None => (Emotion::Neutral, raw),
        };

        let text = self.any_tag.replace_all(body, "").trim().to_string();
        if text.is_empty() {
            return None;
        }
        Some(IdleUtterance::new(text, emotion))
    }
}

pub fn build_idle_prompt(template: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!("{template}{IDLE_AI_SYSTEM_PROMPT_SUFFIX}")),
        ChatMessage::user(IDLE_AI_USER_PROMPT),
    ]
}

/// Ask `backend` for one idle line. `Ok(None)` means the model answered with
/// nothing usable.
pub async fn generate_idle_phrase(
    backend: &dyn ChatBackend,
    parser: &EmotionTagParser,
    template: &str,
) -> Result<Option<IdleUtterance>> {
    let messages = build_idle_prompt(template);
    let chunks = backend.complete(&messages).await?;

    let full: String = chunks
        .iter()
        .filter(|c| !c.starts_with(THINKING_MARKER))
        .map(String::as_str)
        .collect();

    let parsed = parser.parse(&full);
    if parsed.is_none() {
        tracing::debug!("idle generation returned no usable text");
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChatBackend;
    use crate::ChatRole;

    fn parser() -> EmotionTagParser {
        EmotionTagParser::new().unwrap()
    }

    #[test]
    fn test_parse_leading_tag() {
        let u = parser().parse("[happy]こんにちは！").unwrap();
        assert_eq!(u.text, "こんにちは！");
        assert_eq!(u.emotion, Emotion::Happy);
    }

    #[test]
    fn test_parse_unknown_tag_is_neutral() {
        let u = parser().parse("  [sleepy] zzz").unwrap();
        assert_eq!(u.text, "zzz");
        assert_eq!(u.emotion, Emotion::Neutral);
    }

    #[test]
    fn test_parse_strips_inner_tags() {
        let u = parser().parse("[Sad]It rained [relaxed]all day").unwrap();
        assert_eq!(u.text, "It rained all day");
        assert_eq!(u.emotion, Emotion::Sad);
    }

    #[test]
    fn test_parse_without_tag() {
        let u = parser().parse("Just text").unwrap();
        assert_eq!(u.text, "Just text");
        assert_eq!(u.emotion, Emotion::Neutral);
    }

    #[test]
    fn test_parse_empty_is_none() {
        assert!(parser().parse("").is_none());
        assert!(parser().parse("   ").is_none());
        assert!(parser().parse("[happy]").is_none());
    }

    #[test]
    fn test_prompt_uses_template_only() {
        let msgs = build_idle_prompt("You are a shop mascot.");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, ChatRole::System);
        assert!(msgs[0].content.starts_with("You are a shop mascot."));
        assert!(msgs[0].content.contains("[happy]"));
        assert_eq!(msgs[1].role, ChatRole::User);
    }

    #[tokio::test]
    async fn test_generate_skips_thinking_chunks() {
        let backend = MockChatBackend::new().with_chunks([
            format!("{THINKING_MARKER}let me think"),
            "[surprised]".to_string(),
            "Oh, you're back!".to_string(),
        ]);
        let u = generate_idle_phrase(&backend, &parser(), "tmpl")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(u.text, "Oh, you're back!");
        assert_eq!(u.emotion, Emotion::Surprised);
        assert_eq!(backend.calls(), 1);
        let seen = backend.last_messages();
        assert!(seen[0].content.starts_with("tmpl"));
    }

    #[tokio::test]
    async fn test_generate_empty_response() {
        let backend = MockChatBackend::new().with_reply("");
        let out = generate_idle_phrase(&backend, &parser(), "tmpl").await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_generate_propagates_backend_error() {
        let backend = MockChatBackend::new().with_error("rate limited");
        assert!(generate_idle_phrase(&backend, &parser(), "tmpl").await.is_err());
    }
}
