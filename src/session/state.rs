use crate::error::SpeechError;
use crate::recognition::events::CancellationErrorCode;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a [`SpeechSession`](super::SpeechSession).
///
/// `Idle → Starting → Listening ⇄ Synthesizing → Draining → Stopped`.
/// A stopped session cannot be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeechSessionState {
    Idle,
    Starting,
    Listening,
    Synthesizing,
    Draining,
    Stopped,
}

impl SpeechSessionState {
    /// Returns true once the session began tearing down.
    pub fn is_terminal(self) -> bool {
        matches!(self, SpeechSessionState::Draining | SpeechSessionState::Stopped)
    }
}

impl fmt::Display for SpeechSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// `shutdown()` was called, or the recognizer was stopped on request.
    Shutdown,
    /// The input stream ended and the recognizer finished normally.
    EndOfStream,
    /// The recognizer canceled with an error.
    Canceled,
    /// The recognizer could not be started.
    EngineFailure,
}

/// Outcome reported once through
/// [`SessionListener::on_session_ended`](super::SessionListener::on_session_ended).
#[derive(Debug, Clone)]
pub struct SessionEnd {
    pub reason: EndReason,
    pub error: Option<Arc<SpeechError>>,
}

impl SessionEnd {
    pub fn new(reason: EndReason, error: Option<SpeechError>) -> Self {
        Self {
            reason,
            error: error.map(Arc::new),
        }
    }

    /// Error code of an error cancellation, if any.
    pub fn cancellation_code(&self) -> Option<CancellationErrorCode> {
        match self.error.as_deref() {
            Some(SpeechError::SessionCanceled { code, .. }) => *code,
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
