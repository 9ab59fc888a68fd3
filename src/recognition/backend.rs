//! Seam between the recognition engine and a concrete recognizer.

use crate::audio::input_buffer::AudioInputReader;
use crate::error::Result;
use crate::recognition::events::{
    CancellationErrorCode, CancellationReason, RecognitionEvent, RecognitionResult,
};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, select};
use std::sync::atomic::{AtomicBool, Ordering};

/// A continuous speech recognizer.
///
/// The engine calls [`start`](Self::start) once, then runs
/// [`recognize`](Self::recognize) on a dedicated worker thread until the
/// input ends or stop is requested, and finally [`release`](Self::release)
/// exactly once.
pub trait RecognitionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend reports `SessionStarted`/`SessionStopped` itself.
    fn emits_session_events(&self) -> bool {
        true
    }

    /// Connects to the recognizer. Failure here is an engine start failure.
    fn start(&self) -> Result<()>;

    /// Consumes `reader` and publishes events until the stream ends.
    ///
    /// An `Err` is reported to the session as a runtime cancellation.
    fn recognize(&self, reader: AudioInputReader, events: &EventPublisher) -> Result<()>;

    fn release(&self);
}

/// Callback surface handed to a backend.
///
/// Each method tags its callback as a [`RecognitionEvent`] and pushes it
/// into the engine's bounded queue. A full queue blocks the backend until
/// the session catches up or stop is requested. Nothing is delivered after
/// `SessionStopped`.
pub struct EventPublisher {
    tx: Sender<RecognitionEvent>,
    stop: Receiver<()>,
    closed: AtomicBool,
}

impl EventPublisher {
    pub(crate) fn new(tx: Sender<RecognitionEvent>, stop: Receiver<()>) -> Self {
        Self {
            tx,
            stop,
            closed: AtomicBool::new(false),
        }
    }

    pub fn recognizing(&self, text: impl Into<String>) -> bool {
        self.publish(RecognitionEvent::partial(text))
    }

    pub fn recognized(&self, result: RecognitionResult) -> bool {
        self.publish(result.into())
    }

    pub fn canceled(
        &self,
        reason: CancellationReason,
        code: Option<CancellationErrorCode>,
        details: Option<String>,
    ) -> bool {
        self.publish(RecognitionEvent::Canceled {
            reason,
            code,
            details,
        })
    }

    pub fn session_started(&self) -> bool {
        self.publish(RecognitionEvent::SessionStarted)
    }

    pub fn session_stopped(&self) -> bool {
        self.publish(RecognitionEvent::SessionStopped)
    }

    /// Returns true once the engine asked the backend to stop.
    pub fn is_stop_requested(&self) -> bool {
        matches!(self.stop.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Returns true once `SessionStopped` was published.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pushes any event. Returns false if it was not delivered.
    pub fn publish(&self, event: RecognitionEvent) -> bool {
        if event == RecognitionEvent::SessionStopped {
            if self.closed.swap(true, Ordering::SeqCst) {
                return false;
            }
        } else if self.is_closed() {
            return false;
        }

        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Disconnected(_)) => false,
            Err(TrySendError::Full(event)) => select! {
                send(self.tx, event) -> sent => sent.is_ok(),
                recv(self.stop) -> _ => false,
            },
        }
    }
}
