//! Whisper-compatible `/audio/transcriptions` client.

use crate::{Result, Transcriber, VoiceError};
use async_trait::async_trait;
use std::io::Cursor;

pub struct HttpTranscriber {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            client,
        })
    }
}

/// Encode mono 16-bit PCM as a WAV file in memory.
pub fn encode_wav(pcm: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoiceError::Transcription(format!("wav encode: {e}")))?;
        for s in pcm {
            writer
                .write_sample(*s)
                .map_err(|e| VoiceError::Transcription(format!("wav encode: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| VoiceError::Transcription(format!("wav encode: {e}")))?;
    }
    Ok(cursor.into_inner())
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        pcm: &[i16],
        sample_rate: u32,
        language: Option<&str>,
    ) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct RespBody {
            text: String,
        }

        let wav = encode_wav(pcm, sample_rate)?;
        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone());
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let mut req = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(VoiceError::Transcription(format!("HTTP {}", resp.status())));
        }
        let body: RespBody = resp
            .json()
            .await
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        Ok(body.text)
    }
}
