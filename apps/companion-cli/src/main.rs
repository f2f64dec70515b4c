use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use companion_context::{load_settings_file, CompanionSettings, HomeContext, ManualClock};
use idle_speech::{EmotionTagParser, IdleScheduler, TickOutcome};
use mouth_sync::{MouthAnimator, MouthSprites, MouthState, MouthSyncSettings, VolumeAnalyzer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "companion",
    version,
    about = "Avatar companion tools",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a settings file, report normalizations and print the result
    SettingsCheck {
        #[arg(long)]
        config: PathBuf,
        /// Print as JSON instead of YAML
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Show which idle lines would be spoken, in order
    IdlePreview {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Number of idle cycles to simulate
        #[arg(long, default_value_t = 5)]
        count: u32,
        /// Local hour used for time-of-day greetings
        #[arg(long, default_value_t = 12)]
        hour: u8,
    },
    /// Split a model reply into emotion and text
    ParseEmotion {
        /// Raw reply, e.g. "[happy] Hello there"
        text: String,
    },
    /// Run mouth sync over a WAV file and summarize the shapes
    MouthAnalyze {
        #[arg(long)]
        wav: PathBuf,
        /// Sensitivity 0..100
        #[arg(long, default_value_t = 50.0)]
        sensitivity: f32,
        /// Use basic smoothing instead of the HQ envelope
        #[arg(long, action = ArgAction::SetTrue)]
        basic: bool,
        /// Print every state change
        #[arg(long, action = ArgAction::SetTrue)]
        timeline: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::SettingsCheck { config, json } => settings_check(config, json),
        Commands::IdlePreview {
            config,
            count,
            hour,
        } => idle_preview(config, count, hour).await,
        Commands::ParseEmotion { text } => parse_emotion(&text),
        Commands::MouthAnalyze {
            wav,
            sensitivity,
            basic,
            timeline,
        } => mouth_analyze(wav, sensitivity, basic, timeline),
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn settings_check(config: PathBuf, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(&config)
        .with_context(|| format!("reading {}", config.display()))?;
    let mut settings: CompanionSettings = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing {}", config.display()))?;
    let warnings = settings.validate();

    for w in &warnings {
        eprintln!("warning: {w}");
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        print!("{}", serde_yaml::to_string(&settings)?);
    }
    info!(warnings = warnings.len(), "settings ok");
    Ok(())
}

async fn idle_preview(config: Option<PathBuf>, count: u32, hour: u8) -> Result<()> {
    let mut idle = match config {
        Some(path) => load_settings_file(path)?.idle,
        None => CompanionSettings::default().idle,
    };
    idle.enabled = true;
    // generated lines need a live endpoint
    idle.ai_generation_enabled = false;

    let clock = ManualClock::at_hour(hour.min(23));
    let mut scheduler = IdleScheduler::new(idle, HomeContext::new(), Arc::new(clock.clone()))?;
    let interval = scheduler.settings().interval();

    for cycle in 1..=count {
        clock.advance(interval);
        match scheduler.tick().await {
            TickOutcome::EmitPhrase(line) => {
                println!("{cycle:>3}  +{:>4}s  [{}] {}", interval.as_secs(), line.emotion, line.text);
                scheduler.speech_completed();
            }
            TickOutcome::Noop => println!("{cycle:>3}  +{:>4}s  (nothing to say)", interval.as_secs()),
        }
    }
    Ok(())
}

fn parse_emotion(text: &str) -> Result<()> {
    let parser = EmotionTagParser::new()?;
    match parser.parse(text) {
        Some(line) => println!("{}", serde_json::to_string(&line)?),
        None => println!("null"),
    }
    Ok(())
}

#[derive(Serialize)]
struct MouthSummary {
    duration_secs: f64,
    frames: usize,
    changes: usize,
    time_in_state_secs: BTreeMap<String, f64>,
}

fn mouth_analyze(wav: PathBuf, sensitivity: f32, basic: bool, timeline: bool) -> Result<()> {
    let mut reader =
        hound::WavReader::open(&wav).with_context(|| format!("opening {}", wav.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .collect::<std::result::Result<Vec<_>, _>>()?
                .chunks(channels)
                .map(|frame| frame[0] as f32 / scale)
                .collect()
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?
            .chunks(channels)
            .map(|frame| frame[0])
            .collect(),
    };

    let mut analyzer = VolumeAnalyzer::new(spec.sample_rate)?;
    let mut frames = Vec::new();
    analyzer.process(&samples, &mut frames);

    let settings = MouthSyncSettings {
        sensitivity,
        hq_audio: !basic,
        ..MouthSyncSettings::default()
    };
    let mut animator = MouthAnimator::new(settings, MouthSprites::all());
    let frame_len = Duration::from_secs_f64(analyzer.report_samples() as f64 / f64::from(spec.sample_rate));

    let mut time_in_state: BTreeMap<String, f64> = BTreeMap::new();
    let mut changes = 0;
    let mut prev = MouthState::Closed;
    let mut t = Duration::ZERO;
    for frame in &frames {
        t += frame_len;
        let state = animator.process(*frame, t);
        if state != prev {
            changes += 1;
            if timeline {
                println!("{:>8.3}s  {prev} -> {state}", t.as_secs_f64());
            }
            prev = state;
        }
        *time_in_state.entry(state.to_string()).or_default() += frame_len.as_secs_f64();
    }

    let summary = MouthSummary {
        duration_secs: samples.len() as f64 / f64::from(spec.sample_rate),
        frames: frames.len(),
        changes,
        time_in_state_secs: time_in_state,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
