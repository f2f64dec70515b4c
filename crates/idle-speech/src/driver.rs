use crate::{IdleScheduler, IdleUtterance, Result, SpeechSink, TickOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_secs(1);

/// Runs an [`IdleScheduler`] once a second and plays what it emits.
///
/// User activity observed on the home context aborts playback, flushes the
/// sink and restarts the countdown.
pub struct IdleDriver<S: SpeechSink + ?Sized + 'static> {
    scheduler: IdleScheduler,
    sink: Arc<S>,
}

impl<S: SpeechSink + ?Sized + 'static> IdleDriver<S> {
    pub fn new(scheduler: IdleScheduler, sink: Arc<S>) -> Self {
        Self { scheduler, sink }
    }

    /// Run until `cancel` fires. Returns the scheduler for inspection.
    pub async fn run(mut self, cancel: CancellationToken) -> IdleScheduler {
        let ctx = self.scheduler.context().clone();
        let mut activity = ctx.subscribe();
        let mut last_seq = activity.borrow_and_update().user_activity_seq;
        let mut playback: Option<JoinHandle<Result<()>>> = None;

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = activity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let seq = activity.borrow_and_update().user_activity_seq;
                    if seq != last_seq {
                        last_seq = seq;
                        self.on_user_activity(&mut playback);
                    }
                }
                res = join_playback(&mut playback), if playback.is_some() => {
                    playback = None;
                    ctx.set_speaking(false);
                    match res {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::warn!(error = %e, "idle playback failed"),
                        Err(e) => tracing::warn!(error = %e, "idle playback task ended abnormally"),
                    }
                    self.scheduler.speech_completed();
                }
                _ = ticker.tick() => {
                    if let TickOutcome::EmitPhrase(utterance) = self.scheduler.tick().await {
                        playback = Some(self.start_playback(utterance));
                    }
                }
            }
        }

        if let Some(handle) = playback.take() {
            handle.abort();
            self.sink.stop_all();
            ctx.set_speaking(false);
            self.scheduler.interrupt();
        }
        self.scheduler
    }

    fn start_playback(&self, utterance: IdleUtterance) -> JoinHandle<Result<()>> {
        let session_id = self
            .scheduler
            .session_id()
            .map(str::to_string)
            .unwrap_or_default();
        self.scheduler.context().set_speaking(true);
        let sink = self.sink.clone();
        tokio::spawn(async move { sink.speak(&session_id, &utterance).await })
    }

    fn on_user_activity(&mut self, playback: &mut Option<JoinHandle<Result<()>>>) {
        if let Some(handle) = playback.take() {
            handle.abort();
            self.sink.stop_all();
            self.scheduler.context().set_speaking(false);
        }
        self.scheduler.interrupt();
    }
}

async fn join_playback(
    playback: &mut Option<JoinHandle<Result<()>>>,
) -> core::result::Result<Result<()>, JoinError> {
    match playback {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
