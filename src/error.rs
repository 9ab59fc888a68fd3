//! Error types for speechloop.

use crate::recognition::events::{CancellationErrorCode, CancellationReason};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    // Audio stream errors
    #[error("Audio stream is closed")]
    StreamClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {message}")]
    Wav { message: String },

    // Recognition engine errors
    #[error("Recognizer failed to start: {message}")]
    EngineStart { message: String },

    #[error("Recognizer failed to stop: {message}")]
    EngineStop { message: String },

    #[error("Recognizer did not acknowledge stop within {timeout_ms}ms")]
    EngineStopTimeout { timeout_ms: u64 },

    #[error("Recognizer was already started")]
    EngineAlreadyStarted,

    // Translation errors
    #[error("Translation failed: {message}")]
    Translation { message: String },

    #[error("Refusing to translate empty text")]
    EmptyTranslationText,

    // Synthesis errors
    #[error("Synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Synthesis already in progress")]
    SynthesisBusy,

    #[error("Synthesizer has been released")]
    SynthesisReleased,

    // Session errors
    #[error("Session canceled: {}", cancel_message(.reason, .code))]
    SessionCanceled {
        reason: CancellationReason,
        code: Option<CancellationErrorCode>,
        details: Option<String>,
    },

    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Transcription errors (continuous recognizer)
    #[error("Transcription model not found at {path}")]
    TranscriptionModelNotFound { path: String },

    #[error("Transcription error: {message}")]
    Transcription { message: String },

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

/// Coarse grouping of [`SpeechError`] used by the session's propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Stream write/read failures; recovered locally.
    Io,
    /// Recognizer start/stop failures; fatal to the session.
    Engine,
    /// Utterance-local; the original text is synthesized instead.
    Translation,
    /// Utterance-local; the turn produces no outbound audio.
    Synthesis,
    /// Session cancellation reported by the recognizer.
    Canceled,
    Config,
    Transcription,
    Other,
}

impl SpeechError {
    /// Returns the category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SpeechError::StreamClosed | SpeechError::Io(_) | SpeechError::Wav { .. } => {
                ErrorCategory::Io
            }
            SpeechError::EngineStart { .. }
            | SpeechError::EngineStop { .. }
            | SpeechError::EngineStopTimeout { .. }
            | SpeechError::EngineAlreadyStarted => ErrorCategory::Engine,
            SpeechError::Translation { .. } | SpeechError::EmptyTranslationText => {
                ErrorCategory::Translation
            }
            SpeechError::Synthesis { .. }
            | SpeechError::SynthesisBusy
            | SpeechError::SynthesisReleased => ErrorCategory::Synthesis,
            SpeechError::SessionCanceled { .. } => ErrorCategory::Canceled,
            SpeechError::ConfigFileNotFound { .. }
            | SpeechError::ConfigInvalidValue { .. }
            | SpeechError::Config(_) => ErrorCategory::Config,
            SpeechError::TranscriptionModelNotFound { .. } | SpeechError::Transcription { .. } => {
                ErrorCategory::Transcription
            }
            SpeechError::Other(_) => ErrorCategory::Other,
        }
    }

    /// Returns true if this error ends the session.
    ///
    /// Engine failures and error-reason cancellations are fatal; everything
    /// else is absorbed where it happens.
    pub fn is_fatal(&self) -> bool {
        match self {
            SpeechError::SessionCanceled { reason, .. } => *reason == CancellationReason::Error,
            other => other.category() == ErrorCategory::Engine,
        }
    }
}

fn cancel_message(reason: &CancellationReason, code: &Option<CancellationErrorCode>) -> String {
    match code {
        Some(code) => format!("{reason:?} (code {code:?})"),
        None => format!("{reason:?}"),
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SpeechError>;
