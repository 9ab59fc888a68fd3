use crate::error::{Result, SpeechError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Text produced for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    /// Transcribed text, trimmed. Empty when nothing intelligible was heard.
    pub text: String,
    /// Detected language code, empty when unknown.
    pub language: String,
    /// Confidence in 0.0..=1.0.
    pub confidence: f32,
}

impl TranscriptionResult {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Speech-to-text over one buffered utterance.
///
/// Implementations are swappable (whisper vs mock) and shared between
/// recognizer threads.
pub trait Transcriber: Send + Sync {
    /// Transcribe 16-bit PCM samples at 16kHz mono.
    fn transcribe(&self, audio: &[i16]) -> Result<TranscriptionResult>;

    /// Name of the loaded model.
    fn model_name(&self) -> &str;

    fn is_ready(&self) -> bool;
}

impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[i16]) -> Result<TranscriptionResult> {
        (**self).transcribe(audio)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Mock transcriber for tests.
///
/// Returns the queued responses in order, then repeats the last one.
#[derive(Debug)]
pub struct MockTranscriber {
    model_name: String,
    responses: Vec<String>,
    should_fail: bool,
    calls: AtomicUsize,
}

impl MockTranscriber {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            responses: vec!["mock transcription".to_string()],
            should_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Replaces the responses with a single one.
    pub fn with_response(mut self, response: &str) -> Self {
        self.responses = vec![response.to_string()];
        self
    }

    /// Replaces the responses with a sequence, one per call.
    pub fn with_responses(mut self, responses: &[&str]) -> Self {
        self.responses = responses.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Number of transcribe calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &[i16]) -> Result<TranscriptionResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(SpeechError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }
        let text = self
            .responses
            .get(call)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();
        Ok(TranscriptionResult {
            text,
            language: "en".to_string(),
            confidence: 1.0,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_returns_response() {
        let transcriber = MockTranscriber::new("test-model").with_response("Hello there");
        let result = transcriber.transcribe(&[0i16; 1000]).unwrap();
        assert_eq!(result.text, "Hello there");
        assert_eq!(transcriber.calls(), 1);
    }

    #[test]
    fn test_mock_sequence_then_repeats_last() {
        let transcriber = MockTranscriber::new("m").with_responses(&["one", "two"]);
        let texts: Vec<String> = (0..3)
            .map(|_| transcriber.transcribe(&[]).unwrap().text)
            .collect();
        assert_eq!(texts, vec!["one", "two", "two"]);
    }

    #[test]
    fn test_mock_failure() {
        let transcriber = MockTranscriber::new("m").with_failure();
        assert!(!transcriber.is_ready());
        match transcriber.transcribe(&[0i16; 10]) {
            Err(SpeechError::Transcription { message }) => {
                assert_eq!(message, "mock transcription failure");
            }
            other => panic!("Expected Transcription error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_result_detection() {
        let transcriber = MockTranscriber::new("m").with_response("   ");
        assert!(transcriber.transcribe(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_trait_object_through_arc() {
        let transcriber: Arc<dyn Transcriber> =
            Arc::new(MockTranscriber::new("shared").with_response("boxed"));
        assert_eq!(transcriber.model_name(), "shared");
        assert!(transcriber.is_ready());
        assert_eq!(transcriber.transcribe(&[]).unwrap().text, "boxed");
    }
}
