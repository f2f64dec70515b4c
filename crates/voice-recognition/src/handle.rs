use crate::{Result, VoiceError, VoiceRecognitionDispatcher, VoiceStatus};
use companion_context::RecognitionMode;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(100);

enum Command {
    Start(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<Result<()>>),
    Toggle(oneshot::Sender<Result<()>>),
    InputChange(String),
    SendMessage(oneshot::Sender<Result<bool>>),
    StopSpeaking,
    SpeakCompleted,
    SetMode(RecognitionMode, oneshot::Sender<Result<()>>),
    SetContinuous(bool, oneshot::Sender<Result<()>>),
}

/// Cloneable handle to a running voice dispatcher.
///
/// The handle stays valid across mode switches. Commands run one at a time in
/// the order they were sent, so a stop sent while a start is still pending
/// takes effect after the start completes.
#[derive(Clone)]
pub struct VoiceHandle {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<VoiceStatus>,
}

impl VoiceHandle {
    pub fn status(&self) -> VoiceStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VoiceStatus> {
        self.status.clone()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| VoiceError::Closed)?;
        rx.await.map_err(|_| VoiceError::Closed)?
    }

    fn notify(&self, cmd: Command) -> Result<()> {
        self.tx.send(cmd).map_err(|_| VoiceError::Closed)
    }

    pub async fn start_listening(&self) -> Result<()> {
        self.request(Command::Start).await
    }

    pub async fn stop_listening(&self) -> Result<()> {
        self.request(Command::Stop).await
    }

    pub async fn toggle_listening(&self) -> Result<()> {
        self.request(Command::Toggle).await
    }

    pub fn handle_input_change(&self, text: impl Into<String>) -> Result<()> {
        self.notify(Command::InputChange(text.into()))
    }

    pub async fn handle_send_message(&self) -> Result<bool> {
        self.request(Command::SendMessage).await
    }

    pub fn handle_stop_speaking(&self) -> Result<()> {
        self.notify(Command::StopSpeaking)
    }

    pub fn on_speak_completion(&self) -> Result<()> {
        self.notify(Command::SpeakCompleted)
    }

    pub async fn set_mode(&self, mode: RecognitionMode) -> Result<()> {
        self.request(|reply| Command::SetMode(mode, reply)).await
    }

    pub async fn set_continuous_listening(&self, enabled: bool) -> Result<()> {
        self.request(|reply| Command::SetContinuous(enabled, reply))
            .await
    }
}

/// Move `dispatcher` onto its own task. The task ends when `cancel` fires or
/// every handle is dropped, finishing any open or untranscribed session, and
/// yields the dispatcher back.
pub fn spawn_voice_actor(
    dispatcher: VoiceRecognitionDispatcher,
    cancel: CancellationToken,
) -> (VoiceHandle, JoinHandle<VoiceRecognitionDispatcher>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(dispatcher.status());
    let task = tokio::spawn(run(dispatcher, rx, status_tx, cancel));
    (
        VoiceHandle {
            tx,
            status: status_rx,
        },
        task,
    )
}

async fn run(
    mut d: VoiceRecognitionDispatcher,
    mut rx: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<VoiceStatus>,
    cancel: CancellationToken,
) -> VoiceRecognitionDispatcher {
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(cmd) => apply(&mut d, cmd).await,
                None => break,
            },
            _ = ticker.tick() => d.tick().await,
        }
        publish(&d, &status);
    }

    if let Err(e) = d.finish().await {
        tracing::warn!(error = %e, "finishing recognition on shutdown failed");
    }
    publish(&d, &status);
    d
}

async fn apply(d: &mut VoiceRecognitionDispatcher, cmd: Command) {
    // a dropped reply receiver just means the caller stopped waiting
    match cmd {
        Command::Start(reply) => {
            let _ = reply.send(d.start_listening().await);
        }
        Command::Stop(reply) => {
            let _ = reply.send(d.stop_listening().await);
        }
        Command::Toggle(reply) => {
            let _ = reply.send(d.toggle_listening().await);
        }
        Command::InputChange(text) => d.handle_input_change(&text),
        Command::SendMessage(reply) => {
            let _ = reply.send(d.handle_send_message().await);
        }
        Command::StopSpeaking => d.handle_stop_speaking(),
        Command::SpeakCompleted => d.on_speak_completion(),
        Command::SetMode(mode, reply) => {
            let _ = reply.send(d.set_mode(mode).await);
        }
        Command::SetContinuous(enabled, reply) => {
            let _ = reply.send(d.set_continuous_listening(enabled).await);
        }
    }
}

fn publish(d: &VoiceRecognitionDispatcher, status: &watch::Sender<VoiceStatus>) {
    let next = d.status();
    status.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProviders;
    use companion_context::{HomeContext, ManualClock, VoiceSettings};
    use std::sync::Arc;

    fn spawn(
        providers: &MockProviders,
        cancel: &CancellationToken,
    ) -> (VoiceHandle, JoinHandle<VoiceRecognitionDispatcher>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let d = VoiceRecognitionDispatcher::new(
            VoiceSettings::default(),
            Box::new(providers.clone()),
            HomeContext::new(),
            Arc::new(ManualClock::new()),
            tx,
        )
        .unwrap();
        spawn_voice_actor(d, cancel.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_start_pending_is_honored() {
        let providers = MockProviders::new();
        providers.set_stream_start_delay(Duration::from_millis(500));
        let cancel = CancellationToken::new();
        let (handle, task) = spawn(&providers, &cancel);

        let starter = handle.clone();
        let start = tokio::spawn(async move { starter.start_listening().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop_listening().await.unwrap();
        start.await.unwrap().unwrap();

        assert!(!handle.status().session.is_listening);
        assert_eq!(providers.calls(), vec!["stream.start", "stream.stop"]);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_survives_mode_switch() {
        let providers = MockProviders::new();
        let cancel = CancellationToken::new();
        let (handle, task) = spawn(&providers, &cancel);
        let kept = handle.clone();

        handle.start_listening().await.unwrap();
        handle.set_mode(RecognitionMode::Whisper).await.unwrap();
        assert_eq!(kept.status().mode, RecognitionMode::Whisper);
        assert!(!kept.status().session.is_listening);

        kept.toggle_listening().await.unwrap();
        assert!(handle.status().session.is_listening);
        assert_eq!(providers.count("stream.stop"), 1);
        assert_eq!(providers.count("capture.start"), 1);

        cancel.cancel();
        let d = task.await.unwrap();
        assert!(!d.is_listening());
        assert_eq!(providers.count("capture.stop"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_actor_reports_error() {
        let providers = MockProviders::new();
        let cancel = CancellationToken::new();
        let (handle, task) = spawn(&providers, &cancel);
        cancel.cancel();
        task.await.unwrap();
        assert!(matches!(handle.start_listening().await, Err(VoiceError::Closed)));
        assert!(handle.handle_input_change("x").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_transcribes_pending_recording() {
        let providers = MockProviders::new();
        providers.set_transcript("good night");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let d = VoiceRecognitionDispatcher::new(
            VoiceSettings {
                recognition_mode: RecognitionMode::Whisper,
                ..VoiceSettings::default()
            },
            Box::new(providers.clone()),
            HomeContext::new(),
            Arc::new(ManualClock::new()),
            tx,
        )
        .unwrap();
        let cancel = CancellationToken::new();
        let (handle, task) = spawn_voice_actor(d, cancel.clone());

        handle.start_listening().await.unwrap();
        cancel.cancel();
        let d = task.await.unwrap();

        assert!(!d.snapshot().is_processing);
        assert_eq!(rx.try_recv().unwrap().text, "good night");
        assert_eq!(providers.count("transcribe"), 1);
    }
}
