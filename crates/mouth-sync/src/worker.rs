use crate::{Error, Result, VolumeAnalyzer, VolumeFrame};
use std::sync::mpsc;
use std::thread::JoinHandle;

/// Channels to an analyzer thread.
///
/// Dropping `input` ends the thread once queued audio is drained.
pub struct AnalyzerHandle {
    pub input: mpsc::Sender<Vec<f32>>,
    pub frames: mpsc::Receiver<VolumeFrame>,
    pub thread: JoinHandle<()>,
}

/// Run a [`VolumeAnalyzer`] on a dedicated thread. Sending audio never blocks.
pub fn spawn_analyzer(sample_rate: u32) -> Result<AnalyzerHandle> {
    let mut analyzer = VolumeAnalyzer::new(sample_rate)?;
    let (input, audio_rx) = mpsc::channel::<Vec<f32>>();
    let (frame_tx, frames) = mpsc::channel::<VolumeFrame>();

    let thread = std::thread::Builder::new()
        .name("volume-analyzer".into())
        .spawn(move || {
            let mut out = Vec::new();
            while let Ok(block) = audio_rx.recv() {
                analyzer.process(&block, &mut out);
                for frame in out.drain(..) {
                    if frame_tx.send(frame).is_err() {
                        tracing::debug!("frame receiver gone, analyzer exiting");
                        return;
                    }
                }
            }
        })
        .map_err(|e| Error::Spawn(e.to_string()))?;

    tracing::debug!(sample_rate, "volume analyzer started");
    Ok(AnalyzerHandle {
        input,
        frames,
        thread,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_reports_frames_and_exits() {
        let AnalyzerHandle {
            input,
            frames,
            thread,
        } = spawn_analyzer(6_000).unwrap();
        input.send(vec![0.25; 150]).unwrap();
        input.send(vec![0.25; 50]).unwrap();
        drop(input);
        thread.join().unwrap();

        let got: Vec<VolumeFrame> = frames.try_iter().collect();
        assert_eq!(got.len(), 2);
        assert!((got[1].rms - 0.25).abs() < 1e-4);
    }
}
