//! Text translation between the recognition and synthesis languages.

#[cfg(feature = "http")]
pub mod http;

use crate::error::{Result, SpeechError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "http")]
pub use http::HttpTranslator;

/// A translation service.
pub trait TranslationBackend: Send + Sync {
    /// Translates `text` from language `from` to language `to`.
    fn translate(&self, text: &str, from: &str, to: &str) -> Result<String>;
}

/// Stateless front door to a [`TranslationBackend`].
#[derive(Clone)]
pub struct TranslationGateway {
    backend: Arc<dyn TranslationBackend>,
}

impl TranslationGateway {
    pub fn new(backend: Arc<dyn TranslationBackend>) -> Self {
        Self { backend }
    }

    /// Translates `text`. Blank input is rejected without calling the backend.
    pub fn translate(&self, text: &str, from: &str, to: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(SpeechError::EmptyTranslationText);
        }
        self.backend.translate(text, from, to)
    }
}

impl std::fmt::Debug for TranslationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationGateway").finish_non_exhaustive()
    }
}

/// In-memory translator for tests.
///
/// Prefixes the text with the target language (`"[de] hello"`) unless a
/// fixed response or a failure is configured.
#[derive(Debug, Default)]
pub struct MockTranslator {
    response: Option<String>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, response: &str) -> Self {
        self.response = Some(response.to_string());
        self
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TranslationBackend for MockTranslator {
    fn translate(&self, text: &str, _from: &str, to: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(SpeechError::Translation {
                message: message.clone(),
            });
        }
        Ok(match &self.response {
            Some(response) => response.clone(),
            None => format!("[{to}] {text}"),
        })
    }
}
