use crate::{UserUtterance, UtteranceSource};
use companion_context::HomeContext;
use tokio::sync::mpsc;

/// Delivers finished user input to the chat pipeline and records it as user
/// activity on the home context.
#[derive(Debug, Clone)]
pub struct UtteranceOutbox {
    tx: mpsc::UnboundedSender<UserUtterance>,
    ctx: HomeContext,
}

impl UtteranceOutbox {
    pub fn new(tx: mpsc::UnboundedSender<UserUtterance>, ctx: HomeContext) -> Self {
        Self { tx, ctx }
    }

    pub fn context(&self) -> &HomeContext {
        &self.ctx
    }

    /// Speech in progress counts as user activity before anything is
    /// delivered.
    pub fn mark_activity(&self) {
        self.ctx.record_user_activity();
    }

    /// Returns false when `text` is blank.
    pub fn deliver(&self, text: &str, source: UtteranceSource) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.ctx.record_user_activity();
        let utterance = UserUtterance {
            text: text.to_string(),
            source,
        };
        if self.tx.send(utterance).is_err() {
            tracing::warn!("user utterance receiver dropped");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliver_trims_and_bumps_activity() {
        let ctx = HomeContext::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outbox = UtteranceOutbox::new(tx, ctx.clone());

        assert!(!outbox.deliver("   ", UtteranceSource::Voice));
        assert_eq!(ctx.user_activity_seq(), 0);

        assert!(outbox.deliver("  hello ", UtteranceSource::Typed));
        assert_eq!(ctx.user_activity_seq(), 1);
        let got = rx.try_recv().unwrap();
        assert_eq!(got.text, "hello");
        assert_eq!(got.source, UtteranceSource::Typed);
    }
}
