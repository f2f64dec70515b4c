//! Default-microphone recording through cpal.

use crate::{AudioCapture, Result, VoiceError};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

/// Mean absolute amplitude (0..1) above which a callback buffer counts as
/// voice activity.
const VOICE_LEVEL: f32 = 0.02;

#[derive(Default)]
struct Shared {
    samples: Mutex<Vec<i16>>,
    voice: AtomicBool,
}

/// Records mono i16 PCM from the default input device.
///
/// cpal streams are not `Send` on every platform, so the stream lives on a
/// dedicated thread that is told to drop it when recording stops.
pub struct MicCapture {
    shared: Arc<Shared>,
    sample_rate: u32,
    stop_tx: Option<mpsc::Sender<()>>,
}

impl MicCapture {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            sample_rate: 16_000,
            stop_tx: None,
        }
    }
}

impl Default for MicCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioCapture for MicCapture {
    async fn start(&mut self) -> Result<()> {
        if self.stop_tx.is_some() {
            return Ok(());
        }
        if let Ok(mut samples) = self.shared.samples.lock() {
            samples.clear();
        }
        self.shared.voice.store(false, Ordering::Relaxed);

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<u32>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared = self.shared.clone();
        std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || match open_default_input(shared) {
                Ok((stream, rate)) => {
                    let _ = ready_tx.send(Ok(rate));
                    // block until told to stop, then drop the stream
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| VoiceError::Device(format!("spawn capture thread: {e}")))?;

        let rate = ready_rx
            .await
            .map_err(|_| VoiceError::Device("capture thread exited".into()))??;
        self.sample_rate = rate;
        self.stop_tx = Some(stop_tx);
        tracing::info!(sample_rate = rate, "microphone open");
        Ok(())
    }

    async fn stop(&mut self) -> Result<Vec<i16>> {
        let Some(stop_tx) = self.stop_tx.take() else {
            return Ok(Vec::new());
        };
        let _ = stop_tx.send(());
        let pcm = self
            .shared
            .samples
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default();
        Ok(pcm)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn take_voice_activity(&mut self) -> bool {
        self.shared.voice.swap(false, Ordering::Relaxed)
    }
}

fn open_default_input(shared: Arc<Shared>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoiceError::Device("no default input device".into()))?;
    let config = device
        .default_input_config()
        .map_err(|e| VoiceError::Device(format!("input config: {e}")))?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels();

    let stream = match config.sample_format() {
        cpal::SampleFormat::I16 => build_stream::<i16, _>(&device, &config.into(), channels, shared, |s| s),
        cpal::SampleFormat::U16 => build_stream::<u16, _>(&device, &config.into(), channels, shared, |s| {
            (i32::from(s) - 32768) as i16
        }),
        cpal::SampleFormat::F32 => build_stream::<f32, _>(&device, &config.into(), channels, shared, |s| {
            (s.clamp(-1.0, 1.0) * 32767.0) as i16
        }),
        other => {
            return Err(VoiceError::Device(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    }?;
    stream
        .play()
        .map_err(|e| VoiceError::Device(format!("stream play: {e}")))?;
    Ok((stream, sample_rate))
}

fn build_stream<T, F>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: u16,
    shared: Arc<Shared>,
    convert: F,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    F: Fn(T) -> i16 + Send + 'static,
{
    let channels = usize::from(channels.max(1));
    device
        .build_input_stream(
            config,
            move |data: &[T], _| {
                // first channel only
                let mono: Vec<i16> = data.chunks_exact(channels).map(|f| convert(f[0])).collect();
                if mono.is_empty() {
                    return;
                }
                let level = mono.iter().map(|s| f32::from(*s).abs()).sum::<f32>()
                    / (mono.len() as f32 * 32768.0);
                if level > VOICE_LEVEL {
                    shared.voice.store(true, Ordering::Relaxed);
                }
                if let Ok(mut samples) = shared.samples.lock() {
                    samples.extend_from_slice(&mono);
                }
            },
            |err| tracing::warn!("input stream error: {err}"),
            None,
        )
        .map_err(|e| VoiceError::Device(format!("build input stream: {e}")))
}
