use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use companion_context::{
    load_settings_file, ChatEndpointSettings, Clock, CompanionSettings, HomeContext,
    RecognitionMode, SystemClock,
};
use idle_speech::{IdleDriver, IdleScheduler, IdleUtterance, SpeechSink};
use presence_watch::{PresenceCommand, PresenceEvent, PresenceMonitor, PresenceWatcher, ScriptedDetector};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use voice_recognition::mock::MockProviders;
use voice_recognition::{spawn_voice_actor, UserUtterance, VoiceHandle, VoiceRecognitionDispatcher};

#[derive(Parser)]
#[command(name = "companion-daemon")]
#[command(about = "Avatar companion coordination daemon (console harness)")]
struct Args {
    /// YAML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listening back-end (browser, whisper, realtime)
    #[arg(long)]
    recognition_mode: Option<RecognitionMode>,

    /// Force idle speech on
    #[arg(long)]
    idle: bool,

    /// Enable the presence watcher
    #[arg(long)]
    presence: bool,

    /// OpenAI-compatible chat completions URL for generated idle lines
    #[arg(long)]
    chat_endpoint: Option<String>,

    /// Model name sent to --chat-endpoint
    #[arg(long, default_value = "gpt-4o-mini")]
    chat_model: String,
}

/// Prints lines instead of synthesizing audio; playback time scales with
/// text length.
struct ConsoleSpeech {
    ctx: HomeContext,
    done: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl SpeechSink for ConsoleSpeech {
    async fn speak(&self, session_id: &str, utterance: &IdleUtterance) -> idle_speech::Result<()> {
        info!(session = session_id, emotion = %utterance.emotion, "says: {}", utterance.text);
        self.ctx.set_speaking(true);
        let chars = utterance.text.chars().count() as u64;
        tokio::time::sleep(Duration::from_millis((chars * 60).max(500))).await;
        self.ctx.set_speaking(false);
        let _ = self.done.send(());
        Ok(())
    }

    fn stop_all(&self) {
        debug!("speech flushed");
        self.ctx.set_speaking(false);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => load_settings_file(path)?,
        None => CompanionSettings::default(),
    };
    apply_overrides(&mut settings, &args);
    info!(
        mode = %settings.voice.recognition_mode,
        idle = settings.idle.enabled,
        presence = settings.presence.enabled,
        "companion daemon starting"
    );

    let ctx = HomeContext::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let cancel = CancellationToken::new();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let speech = Arc::new(ConsoleSpeech {
        ctx: ctx.clone(),
        done: done_tx,
    });

    // voice
    let (utter_tx, mut utter_rx) = mpsc::unbounded_channel::<UserUtterance>();
    let mut dispatcher = VoiceRecognitionDispatcher::new(
        settings.voice.clone(),
        Box::new(MockProviders::new()),
        ctx.clone(),
        clock.clone(),
        utter_tx,
    )
    .context("creating voice dispatcher")?;
    let hook_sink = speech.clone();
    dispatcher.set_speech_stop_hook(move || hook_sink.stop_all());
    let (voice, voice_task) = spawn_voice_actor(dispatcher, cancel.clone());

    // idle speech
    let mut scheduler = IdleScheduler::new(settings.idle.clone(), ctx.clone(), clock.clone())
        .context("creating idle scheduler")?;
    if let Some(chat) = &settings.chat {
        let backend = idle_speech::http::HttpChatBackend::new(chat).context("chat backend")?;
        scheduler = scheduler.with_chat_backend(Arc::new(backend));
    }
    scheduler.set_notice_callback(|notice| debug!(?notice, "idle"));
    let idle_task = tokio::spawn(IdleDriver::new(scheduler, speech.clone()).run(cancel.clone()));

    // presence
    let presence_cmds = if settings.presence.enabled {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let watcher = PresenceWatcher::new(settings.presence.clone(), ctx.clone(), clock.clone());
        let monitor = PresenceMonitor::new(watcher, ScriptedDetector::new([]), event_tx, cmd_rx);
        tokio::spawn(monitor.run(cancel.clone()));
        tokio::spawn(forward_presence(event_rx, cmd_tx.clone(), speech.clone()));
        Some(cmd_tx)
    } else {
        None
    };

    let stdin_voice = voice.clone();
    let stdin_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = read_console(stdin_voice, stdin_cancel).await {
            error!("console input failed: {e:#}");
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = cancel.cancelled() => break,
            Some(utterance) = utter_rx.recv() => {
                info!(source = ?utterance.source, "user: {}", utterance.text);
                ctx.push_chat_message();
            }
            Some(()) = done_rx.recv() => {
                if let Err(e) = voice.on_speak_completion() {
                    warn!("voice actor gone: {e}");
                }
            }
        }
    }

    info!("companion daemon shutting down");
    if let Some(cmds) = presence_cmds {
        let _ = cmds.send(PresenceCommand::Stop);
    }
    cancel.cancel();
    let scheduler = idle_task.await.context("idle task")?;
    debug!(state = ?scheduler.state(), "idle scheduler stopped");
    let dispatcher = voice_task.await.context("voice task")?;
    debug!(listening = dispatcher.is_listening(), "voice dispatcher stopped");
    Ok(())
}

fn apply_overrides(settings: &mut CompanionSettings, args: &Args) {
    if let Some(mode) = args.recognition_mode {
        settings.voice.recognition_mode = mode;
    }
    if args.idle {
        settings.idle.enabled = true;
    }
    if args.presence {
        settings.presence.enabled = true;
    }
    if let Some(url) = &args.chat_endpoint {
        settings.chat = Some(ChatEndpointSettings {
            url: url.clone(),
            model: args.chat_model.clone(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
        });
        settings.idle.ai_generation_enabled = true;
    }
}

async fn forward_presence(
    mut events: mpsc::UnboundedReceiver<PresenceEvent>,
    commands: mpsc::UnboundedSender<PresenceCommand>,
    speech: Arc<ConsoleSpeech>,
) {
    while let Some(event) = events.recv().await {
        info!(?event, "presence");
        match event {
            PresenceEvent::GreetingStart(text) => {
                let greeting = IdleUtterance::new(text, companion_context::Emotion::Happy);
                if let Err(e) = speech.speak("presence-greeting", &greeting).await {
                    warn!("greeting failed: {e}");
                }
                let _ = commands.send(PresenceCommand::CompleteGreeting);
            }
            PresenceEvent::InterruptGreeting => speech.stop_all(),
            _ => {}
        }
    }
}

/// Console commands: `/listen`, `/mode <name>`, `/continuous on|off`,
/// `/stop`, `/quit`. Anything else is typed chat input.
async fn read_console(voice: VoiceHandle, cancel: CancellationToken) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("", _) => continue,
            ("/quit", _) => {
                cancel.cancel();
                break;
            }
            ("/listen", _) => voice.toggle_listening().await?,
            ("/stop", _) => voice.handle_stop_speaking()?,
            ("/mode", name) => match name.parse::<RecognitionMode>() {
                Ok(mode) => voice.set_mode(mode).await?,
                Err(e) => warn!("{e}"),
            },
            ("/continuous", flag) => voice.set_continuous_listening(flag == "on").await?,
            _ => {
                voice.handle_input_change(line)?;
                voice.handle_send_message().await?;
            }
        }
        debug!(status = ?voice.status(), "voice");
    }
    Ok(())
}

fn setup_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
