use crate::{
    AudioCapture, ProviderFactory, RealtimeLink, Result, SpeechStream, StreamEvent, Transcriber,
    VoiceError,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Script {
    log: Vec<String>,
    stream_events: VecDeque<StreamEvent>,
    deny_microphone: bool,
    stream_start_delay: Option<Duration>,
    recording: Vec<i16>,
    voice_activity: bool,
    transcript: String,
    transcribe_delay: Option<Duration>,
    transcribe_fails: bool,
    link_ready: bool,
}

/// Scripted providers sharing one call log.
///
/// Clones share state, so a test can keep a handle after giving one to a
/// dispatcher and keep feeding events or inspecting calls.
#[derive(Clone)]
pub struct MockProviders {
    script: Arc<Mutex<Script>>,
}

impl MockProviders {
    pub fn new() -> Self {
        let script = Script {
            link_ready: true,
            transcript: "mock transcript".to_string(),
            recording: vec![0; 1600],
            ..Script::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> Option<R> {
        self.script.lock().ok().map(|mut s| f(&mut s))
    }

    fn log(&self, entry: impl Into<String>) {
        let entry = entry.into();
        self.with(|s| s.log.push(entry));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.log.clone()).unwrap_or_default()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn push_stream_event(&self, event: StreamEvent) {
        self.with(|s| s.stream_events.push_back(event));
    }

    pub fn deny_microphone(&self) {
        self.with(|s| s.deny_microphone = true);
    }

    pub fn set_stream_start_delay(&self, delay: Duration) {
        self.with(|s| s.stream_start_delay = Some(delay));
    }

    pub fn set_recording(&self, pcm: Vec<i16>) {
        self.with(|s| s.recording = pcm);
    }

    pub fn set_voice_activity(&self, active: bool) {
        self.with(|s| s.voice_activity = active);
    }

    pub fn set_transcript(&self, text: impl Into<String>) {
        let text = text.into();
        self.with(|s| s.transcript = text);
    }

    pub fn set_transcribe_delay(&self, delay: Duration) {
        self.with(|s| s.transcribe_delay = Some(delay));
    }

    pub fn fail_transcription(&self) {
        self.with(|s| s.transcribe_fails = true);
    }

    pub fn set_link_ready(&self, ready: bool) {
        self.with(|s| s.link_ready = ready);
    }

    fn microphone_denied(&self) -> bool {
        self.with(|s| s.deny_microphone).unwrap_or(false)
    }
}

impl Default for MockProviders {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for MockProviders {
    fn speech_stream(&self) -> Result<Box<dyn SpeechStream>> {
        Ok(Box::new(MockSpeechStream {
            providers: self.clone(),
        }))
    }

    fn audio_capture(&self) -> Result<Box<dyn AudioCapture>> {
        Ok(Box::new(MockAudioCapture {
            providers: self.clone(),
            recording: false,
        }))
    }

    fn transcriber(&self) -> Result<Arc<dyn Transcriber>> {
        Ok(Arc::new(MockTranscriber {
            providers: self.clone(),
        }))
    }

    fn realtime_link(&self) -> Result<Box<dyn RealtimeLink>> {
        Ok(Box::new(MockRealtimeLink {
            providers: self.clone(),
        }))
    }
}

pub struct MockSpeechStream {
    providers: MockProviders,
}

#[async_trait]
impl SpeechStream for MockSpeechStream {
    async fn start(&mut self, _language: Option<&str>) -> Result<()> {
        if let Some(delay) = self.providers.with(|s| s.stream_start_delay).flatten() {
            tokio::time::sleep(delay).await;
        }
        if self.providers.microphone_denied() {
            return Err(VoiceError::Permission("NotAllowedError".into()));
        }
        self.providers.log("stream.start");
        Ok(())
    }

    fn stop(&mut self) {
        self.providers.log("stream.stop");
    }

    fn poll_event(&mut self) -> Option<StreamEvent> {
        self.providers.with(|s| s.stream_events.pop_front()).flatten()
    }
}

pub struct MockAudioCapture {
    providers: MockProviders,
    recording: bool,
}

#[async_trait]
impl AudioCapture for MockAudioCapture {
    async fn start(&mut self) -> Result<()> {
        if self.providers.microphone_denied() {
            return Err(VoiceError::Permission("NotAllowedError".into()));
        }
        self.recording = true;
        self.providers.log("capture.start");
        Ok(())
    }

    async fn stop(&mut self) -> Result<Vec<i16>> {
        self.providers.log("capture.stop");
        if !std::mem::replace(&mut self.recording, false) {
            return Ok(Vec::new());
        }
        Ok(self.providers.with(|s| s.recording.clone()).unwrap_or_default())
    }

    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn take_voice_activity(&mut self) -> bool {
        self.providers
            .with(|s| std::mem::replace(&mut s.voice_activity, false))
            .unwrap_or(false)
    }
}

pub struct MockTranscriber {
    providers: MockProviders,
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(
        &self,
        pcm: &[i16],
        _sample_rate: u32,
        _language: Option<&str>,
    ) -> Result<String> {
        self.providers.log("transcribe");
        if let Some(delay) = self.providers.with(|s| s.transcribe_delay).flatten() {
            tokio::time::sleep(delay).await;
        }
        if self.providers.with(|s| s.transcribe_fails).unwrap_or(false) {
            return Err(VoiceError::Transcription("HTTP 500".into()));
        }
        if pcm.is_empty() {
            return Ok(String::new());
        }
        Ok(self
            .providers
            .with(|s| s.transcript.clone())
            .unwrap_or_default())
    }
}

pub struct MockRealtimeLink {
    providers: MockProviders,
}

#[async_trait]
impl RealtimeLink for MockRealtimeLink {
    fn is_ready(&self) -> bool {
        self.providers.with(|s| s.link_ready).unwrap_or(false)
    }

    async fn commit_audio(&mut self, pcm: &[i16], _sample_rate: u32) -> Result<()> {
        self.providers.log(format!("link.audio:{}", pcm.len()));
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.providers.log(format!("link.text:{text}"));
        Ok(())
    }
}
