//! Events produced by a continuous recognizer.

/// Why a recognition session was canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancellationReason {
    /// The recognizer or the service failed.
    Error,
    /// The input stream ended.
    EndOfStream,
    /// Recognition was stopped on request.
    CancelledByUser,
}

/// Error codes reported with [`CancellationReason::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancellationErrorCode {
    AuthenticationFailure,
    BadRequest,
    TooManyRequests,
    Forbidden,
    ConnectionFailure,
    ServiceTimeout,
    ServiceError,
    ServiceUnavailable,
    RuntimeError,
}

/// Outcome of one recognized utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultReason {
    RecognizedSpeech,
    NoMatch,
}

/// Result handed to [`EventPublisher::recognized`](super::EventPublisher::recognized).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    pub reason: ResultReason,
    pub text: String,
    pub speaker_id: Option<String>,
}

impl RecognitionResult {
    pub fn speech(text: impl Into<String>) -> Self {
        Self {
            reason: ResultReason::RecognizedSpeech,
            text: text.into(),
            speaker_id: None,
        }
    }

    pub fn no_match() -> Self {
        Self {
            reason: ResultReason::NoMatch,
            text: String::new(),
            speaker_id: None,
        }
    }

    pub fn with_speaker(mut self, speaker_id: impl Into<String>) -> Self {
        self.speaker_id = Some(speaker_id.into());
        self
    }
}

/// One tagged recognizer callback, delivered in order through the
/// engine's event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Hypothesis for speech still in progress.
    Partial { text: String },
    /// Final text of one utterance.
    Final {
        text: String,
        speaker_id: Option<String>,
    },
    /// An utterance was heard but not recognized.
    NoMatch,
    SessionStarted,
    /// Always the last event of a session.
    SessionStopped,
    Canceled {
        reason: CancellationReason,
        code: Option<CancellationErrorCode>,
        details: Option<String>,
    },
}

impl RecognitionEvent {
    pub fn final_text(text: impl Into<String>) -> Self {
        RecognitionEvent::Final {
            text: text.into(),
            speaker_id: None,
        }
    }

    pub fn partial(text: impl Into<String>) -> Self {
        RecognitionEvent::Partial { text: text.into() }
    }

    pub fn canceled_with_error(code: CancellationErrorCode, details: impl Into<String>) -> Self {
        RecognitionEvent::Canceled {
            reason: CancellationReason::Error,
            code: Some(code),
            details: Some(details.into()),
        }
    }

    /// Short name used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            RecognitionEvent::Partial { .. } => "recognizing",
            RecognitionEvent::Final { .. } => "recognized",
            RecognitionEvent::NoMatch => "no_match",
            RecognitionEvent::SessionStarted => "session_started",
            RecognitionEvent::SessionStopped => "session_stopped",
            RecognitionEvent::Canceled { .. } => "canceled",
        }
    }
}

impl From<RecognitionResult> for RecognitionEvent {
    fn from(result: RecognitionResult) -> Self {
        match result.reason {
            ResultReason::RecognizedSpeech => RecognitionEvent::Final {
                text: result.text,
                speaker_id: result.speaker_id,
            },
            ResultReason::NoMatch => RecognitionEvent::NoMatch,
        }
    }
}
