//! Recognition engine: runs one backend session on a worker thread.
//!
//! Callbacks from the backend become [`RecognitionEvent`]s on a bounded
//! queue that the session drains from its dispatcher thread. Stop is
//! signalled by dropping a sender, which wakes every `select!` parked on it
//! (the publisher and the input reader) at once.

use crate::audio::input_buffer::AudioInputReader;
use crate::error::{Result, SpeechError};
use crate::logging::LogSink;
use crate::recognition::backend::{EventPublisher, RecognitionBackend};
use crate::recognition::events::{CancellationErrorCode, CancellationReason, RecognitionEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const COMPONENT: &str = "recognition";

#[derive(Default)]
struct EngineState {
    started: bool,
    stopped: bool,
    stop_tx: Option<Sender<()>>,
    done_rx: Option<Receiver<()>>,
    worker: Option<JoinHandle<()>>,
}

/// Owns one recognizer for the lifetime of a session.
pub struct RecognitionEngine {
    backend: Arc<dyn RecognitionBackend>,
    event_queue: usize,
    stop_timeout: Duration,
    log: Arc<dyn LogSink>,
    state: Mutex<EngineState>,
}

impl RecognitionEngine {
    pub fn new(
        backend: Arc<dyn RecognitionBackend>,
        event_queue: usize,
        stop_timeout: Duration,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            backend,
            event_queue: event_queue.max(1),
            stop_timeout,
            log,
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn emits_session_events(&self) -> bool {
        self.backend.emits_session_events()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Starts continuous recognition over `reader`.
    ///
    /// One-shot: a second call fails with [`SpeechError::EngineAlreadyStarted`].
    /// A backend that fails in `recognize` surfaces as
    /// `Canceled { Error, RuntimeError }` followed by `SessionStopped`.
    pub fn start(&self, reader: AudioInputReader) -> Result<EventStream> {
        {
            let mut state = self.state();
            if state.started || state.stopped {
                return Err(SpeechError::EngineAlreadyStarted);
            }
            state.started = true;
        }

        self.backend.start().map_err(|e| match e {
            SpeechError::EngineStart { .. } => e,
            other => SpeechError::EngineStart {
                message: other.to_string(),
            },
        })?;

        let (event_tx, event_rx) = bounded(self.event_queue);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let (done_tx, done_rx) = bounded::<()>(1);

        let reader = reader.interrupt_on(stop_rx.clone());
        let backend = Arc::clone(&self.backend);
        let log = Arc::clone(&self.log);
        let name = format!("recognizer-{}", backend.name());

        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let publisher = EventPublisher::new(event_tx, stop_rx);
                if let Err(e) = backend.recognize(reader, &publisher) {
                    log.error(COMPONENT, &format!("Recognizer failed: {e}"));
                    publisher.canceled(
                        CancellationReason::Error,
                        Some(CancellationErrorCode::RuntimeError),
                        Some(e.to_string()),
                    );
                }
                publisher.session_stopped();
                drop(done_tx);
            })
            .map_err(|e| SpeechError::EngineStart {
                message: format!("Failed to spawn recognizer thread: {e}"),
            })?;

        let mut state = self.state();
        state.stop_tx = Some(stop_tx);
        state.done_rx = Some(done_rx);
        state.worker = Some(worker);
        drop(state);

        self.log.info(
            COMPONENT,
            &format!("Continuous recognition started ({})", self.backend.name()),
        );
        Ok(EventStream { rx: event_rx })
    }

    /// Requests stop and waits for the worker to acknowledge.
    ///
    /// Idempotent. The backend is released exactly once, on the first call,
    /// whether or not recognition was ever started. After `stop_timeout` the
    /// worker is detached and [`SpeechError::EngineStopTimeout`] returned.
    pub fn stop(&self) -> Result<()> {
        let (stop_tx, done_rx, worker) = {
            let mut state = self.state();
            if state.stopped {
                return Ok(());
            }
            state.stopped = true;
            (
                state.stop_tx.take(),
                state.done_rx.take(),
                state.worker.take(),
            )
        };

        drop(stop_tx);

        let result = match done_rx {
            None => Ok(()),
            Some(done) => match done.recv_timeout(self.stop_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => join_worker(worker),
                Err(RecvTimeoutError::Timeout) => {
                    self.log.warn(
                        COMPONENT,
                        &format!(
                            "Recognizer did not stop within {}ms, detaching",
                            self.stop_timeout.as_millis()
                        ),
                    );
                    Err(SpeechError::EngineStopTimeout {
                        timeout_ms: self.stop_timeout.as_millis() as u64,
                    })
                }
            },
        };

        self.backend.release();
        self.log.debug(
            COMPONENT,
            &format!("Recognizer {} released", self.backend.name()),
        );
        result
    }

    pub fn is_started(&self) -> bool {
        self.state().started
    }

    pub fn is_stopped(&self) -> bool {
        self.state().stopped
    }
}

impl Drop for RecognitionEngine {
    fn drop(&mut self) {
        if !self.is_stopped()
            && let Err(e) = self.stop()
        {
            self.log.warn(COMPONENT, &format!("Stop on drop failed: {e}"));
        }
    }
}

fn join_worker(worker: Option<JoinHandle<()>>) -> Result<()> {
    let Some(handle) = worker else {
        return Ok(());
    };
    handle.join().map_err(|panic_info| {
        let message = panic_info
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic_info.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        SpeechError::EngineStop {
            message: format!("recognizer thread panicked: {message}"),
        }
    })
}

/// Ordered events of one recognition session.
///
/// Ends (returns `None`) after the worker has finished and every event was
/// consumed; `SessionStopped` is always the last event.
pub struct EventStream {
    rx: Receiver<RecognitionEvent>,
}

impl EventStream {
    /// Blocks for the next event.
    pub fn recv(&self) -> Option<RecognitionEvent> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<RecognitionEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

impl Iterator for EventStream {
    type Item = RecognitionEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}
