use crate::{FaceDetector, PresenceEvent, PresenceWatcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Commands accepted by a running [`PresenceMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceCommand {
    /// The greeting speech finished playing.
    CompleteGreeting,
    /// Retry camera/model start-up after a terminal failure.
    Retry,
    Stop,
}

/// Polls a [`FaceDetector`] at the sensitivity interval and forwards the
/// resulting presence events.
pub struct PresenceMonitor<D: FaceDetector> {
    watcher: PresenceWatcher,
    detector: D,
    events: mpsc::UnboundedSender<PresenceEvent>,
    commands: mpsc::UnboundedReceiver<PresenceCommand>,
}

impl<D: FaceDetector> PresenceMonitor<D> {
    pub fn new(
        watcher: PresenceWatcher,
        detector: D,
        events: mpsc::UnboundedSender<PresenceEvent>,
        commands: mpsc::UnboundedReceiver<PresenceCommand>,
    ) -> Self {
        Self {
            watcher,
            detector,
            events,
            commands,
        }
    }

    /// Run until cancelled or told to stop. Returns the watcher so callers can
    /// inspect the final state.
    pub async fn run(mut self, cancel: CancellationToken) -> PresenceWatcher {
        let interval = self.watcher.settings().sensitivity.poll_interval();
        let _ = self.watcher.start(&mut self.detector).await;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(PresenceCommand::CompleteGreeting) => {
                        if let Some(ev) = self.watcher.complete_greeting() {
                            self.emit(ev);
                        }
                    }
                    Some(PresenceCommand::Retry) => {
                        let _ = self.watcher.start(&mut self.detector).await;
                    }
                    Some(PresenceCommand::Stop) | None => break,
                },
                _ = ticker.tick(), if self.watcher.is_detecting() => {
                    match self.detector.detect().await {
                        Ok(result) => {
                            for ev in self.watcher.observe(&result) {
                                self.emit(ev);
                            }
                        }
                        Err(e) => {
                            self.watcher.report_failure(&e);
                            if e.is_terminal() {
                                self.detector.release();
                            }
                        }
                    }
                }
            }
        }

        self.watcher.stop(&mut self.detector);
        self.watcher
    }

    fn emit(&self, ev: PresenceEvent) {
        if self.events.send(ev).is_err() {
            tracing::debug!("presence event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DetectionResult, ScriptedDetector, ScriptedFailure};
    use companion_context::{
        DetectionSensitivity, HomeContext, ManualClock, PresenceSettings, PresenceState,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn presence_settings() -> PresenceSettings {
        PresenceSettings {
            enabled: true,
            greeting_message: "hi".to_string(),
            greeting_delay_secs: 0.0,
            sensitivity: DetectionSensitivity::High,
            ..PresenceSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_forwards_events_and_completes_greeting() {
        let ctx = HomeContext::new();
        let watcher = PresenceWatcher::new(
            presence_settings(),
            ctx.clone(),
            Arc::new(ManualClock::new()),
        );
        let detector = ScriptedDetector::new([DetectionResult::face(0.9)]);
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let monitor = PresenceMonitor::new(watcher, detector, ev_tx, cmd_rx);
        let task = tokio::spawn(monitor.run(cancel.clone()));

        assert_eq!(ev_rx.recv().await, Some(PresenceEvent::PersonDetected));
        assert_eq!(
            ev_rx.recv().await,
            Some(PresenceEvent::GreetingStart("hi".to_string()))
        );

        cmd_tx.send(PresenceCommand::CompleteGreeting).unwrap();
        assert_eq!(ev_rx.recv().await, Some(PresenceEvent::GreetingComplete));
        assert_eq!(ctx.read().presence_state, PresenceState::ConversationReady);

        cancel.cancel();
        let watcher = task.await.unwrap();
        assert_eq!(watcher.state(), PresenceState::Idle);
        assert!(!watcher.is_detecting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_waits_for_retry_after_terminal_failure() {
        let ctx = HomeContext::new();
        let watcher = PresenceWatcher::new(
            presence_settings(),
            ctx.clone(),
            Arc::new(ManualClock::new()),
        );
        let detector = ScriptedDetector::failing(ScriptedFailure::NoCamera);
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(PresenceMonitor::new(watcher, detector, ev_tx, cmd_rx).run(cancel));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(ev_rx.try_recv().is_err());
        assert!(ctx.read().presence_error.is_some());

        cmd_tx.send(PresenceCommand::Retry).unwrap();
        cmd_tx.send(PresenceCommand::Stop).unwrap();
        let watcher = task.await.unwrap();
        assert!(watcher.error().is_some());
    }
}
