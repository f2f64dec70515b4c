use crate::{
    BrowserBackend, ProviderFactory, RealtimeBackend, RecognitionBackend, Result, UtteranceOutbox,
    WhisperBackend,
};
use companion_context::{Clock, RecognitionMode, VoiceSettings};
use std::sync::Arc;

/// Everything a back-end needs besides its providers.
#[derive(Clone)]
pub struct BackendContext {
    pub settings: VoiceSettings,
    pub clock: Arc<dyn Clock>,
    pub outbox: UtteranceOutbox,
}

pub fn new_recognition_backend(
    mode: RecognitionMode,
    providers: &dyn ProviderFactory,
    bctx: &BackendContext,
) -> Result<Box<dyn RecognitionBackend>> {
    let backend: Box<dyn RecognitionBackend> = match mode {
        RecognitionMode::Browser => Box::new(BrowserBackend::new(
            providers.speech_stream()?,
            &bctx.settings,
            bctx.clock.clone(),
            bctx.outbox.clone(),
        )),
        RecognitionMode::Whisper => Box::new(WhisperBackend::new(
            providers.audio_capture()?,
            providers.transcriber()?,
            &bctx.settings,
            bctx.clock.clone(),
            bctx.outbox.clone(),
        )),
        RecognitionMode::Realtime => Box::new(RealtimeBackend::new(
            providers.audio_capture()?,
            providers.speech_stream()?,
            providers.realtime_link()?,
            &bctx.settings,
            bctx.clock.clone(),
            bctx.outbox.clone(),
        )),
    };
    Ok(backend)
}
