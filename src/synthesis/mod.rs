//! Text-to-speech.
//!
//! [`SynthesisEngine`] wraps one backend for the lifetime of a session and
//! enforces single-flight use: the audio of one utterance must be consumed
//! (dropped) before the next synthesis starts.

#[cfg(feature = "http")]
pub mod http;

use crate::config::SynthesisConfig;
use crate::error::{Result, SpeechError};
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[cfg(feature = "http")]
pub use http::HttpSynthesizer;

/// 16kHz, 16-bit, mono PCM produced by a synthesizer.
pub type AudioStream = Box<dyn Read + Send>;

/// Voice parameters for one synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConfig {
    /// BCP-47 language of the text.
    pub language: String,
    /// Voice name, e.g. `en-US-JennyNeural`.
    pub voice: String,
}

impl VoiceConfig {
    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self {
            language: config.language.clone(),
            voice: config.voice.clone(),
        }
    }
}

/// A text-to-speech service.
pub trait SynthesisBackend: Send + Sync {
    fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<AudioStream>;

    /// Frees service resources. Called once by [`SynthesisEngine::release`].
    fn release(&self) {}
}

/// Session-scoped synthesizer with single-flight admission.
pub struct SynthesisEngine {
    backend: Arc<dyn SynthesisBackend>,
    voice: VoiceConfig,
    busy: Arc<AtomicBool>,
    released: AtomicBool,
}

impl SynthesisEngine {
    pub fn new(backend: Arc<dyn SynthesisBackend>, voice: VoiceConfig) -> Self {
        Self {
            backend,
            voice,
            busy: Arc::new(AtomicBool::new(false)),
            released: AtomicBool::new(false),
        }
    }

    pub fn voice(&self) -> &VoiceConfig {
        &self.voice
    }

    /// Synthesizes `text` with the session voice.
    ///
    /// Fails with [`SpeechError::SynthesisBusy`] while audio from a previous
    /// call is still alive, and with [`SpeechError::SynthesisReleased`] after
    /// [`release`](Self::release).
    pub fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        if self.is_released() {
            return Err(SpeechError::SynthesisReleased);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SpeechError::SynthesisBusy);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let stream = self.backend.synthesize(text, &self.voice)?;
        Ok(SynthesizedAudio {
            stream,
            _guard: guard,
        })
    }

    /// Releases the backend. Idempotent.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.backend.release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Audio of one utterance. Holds the engine's single-flight slot until dropped.
pub struct SynthesizedAudio {
    stream: AudioStream,
    _guard: BusyGuard,
}

impl Read for SynthesizedAudio {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

/// In-memory synthesizer for tests.
///
/// Produces a fixed number of PCM bytes per character unless a fixed
/// payload or a failure is configured. Records every request.
#[derive(Debug)]
pub struct MockSynthesizer {
    bytes_per_char: usize,
    payload: Option<Vec<u8>>,
    failure: Option<String>,
    requests: std::sync::Mutex<Vec<String>>,
    releases: AtomicUsize,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            bytes_per_char: 640,
            payload: None,
            failure: None,
            requests: std::sync::Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn with_bytes_per_char(mut self, bytes: usize) -> Self {
        self.bytes_per_char = bytes;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Texts requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl SynthesisBackend for MockSynthesizer {
    fn synthesize(&self, text: &str, _voice: &VoiceConfig) -> Result<AudioStream> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(text.to_string()),
            Err(poisoned) => poisoned.into_inner().push(text.to_string()),
        }
        if let Some(message) = &self.failure {
            return Err(SpeechError::Synthesis {
                message: message.clone(),
            });
        }
        let data = match &self.payload {
            Some(payload) => payload.clone(),
            None => {
                // Mark each byte with its position so ordering is observable
                let len = text.chars().count() * self.bytes_per_char;
                (0..len).map(|i| (i % 251) as u8).collect()
            }
        };
        Ok(Box::new(Cursor::new(data)))
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice() -> VoiceConfig {
        VoiceConfig {
            language: "en-US".to_string(),
            voice: "en-US-JennyNeural".to_string(),
        }
    }

    #[test]
    fn test_synthesize_returns_backend_audio() {
        let backend = Arc::new(MockSynthesizer::new().with_payload(vec![1, 2, 3]));
        let engine = SynthesisEngine::new(backend.clone(), voice());

        let mut audio = engine.synthesize("hi").unwrap();
        let mut bytes = Vec::new();
        audio.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(backend.requests(), vec!["hi"]);
    }

    #[test]
    fn test_single_flight_until_audio_dropped() {
        let engine = SynthesisEngine::new(Arc::new(MockSynthesizer::new()), voice());

        let first = engine.synthesize("one").unwrap();
        assert!(engine.is_busy());
        assert!(matches!(
            engine.synthesize("two"),
            Err(SpeechError::SynthesisBusy)
        ));

        drop(first);
        assert!(!engine.is_busy());
        assert!(engine.synthesize("three").is_ok());
    }

    #[test]
    fn test_failure_frees_the_slot() {
        let engine = SynthesisEngine::new(
            Arc::new(MockSynthesizer::new().with_failure("voice not found")),
            voice(),
        );
        assert!(matches!(
            engine.synthesize("x"),
            Err(SpeechError::Synthesis { .. })
        ));
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_release_is_idempotent_and_final() {
        let backend = Arc::new(MockSynthesizer::new());
        let engine = SynthesisEngine::new(backend.clone(), voice());

        engine.release();
        engine.release();
        assert_eq!(backend.releases(), 1);
        assert!(matches!(
            engine.synthesize("late"),
            Err(SpeechError::SynthesisReleased)
        ));
    }

    #[test]
    fn test_mock_length_scales_with_text() {
        let backend = MockSynthesizer::new().with_bytes_per_char(10);
        let mut stream = backend.synthesize("abcd", &voice()).unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 40);
    }
}
