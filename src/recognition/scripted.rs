//! Deterministic recognizer that plays back a fixed script.

use crate::audio::input_buffer::AudioInputReader;
use crate::error::{Result, SpeechError};
use crate::recognition::backend::{EventPublisher, RecognitionBackend};
use crate::recognition::events::RecognitionEvent;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// One step of a [`ScriptedRecognizer`] script.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Emit(RecognitionEvent),
    /// Consume this many more bytes of input, or until the stream ends.
    AwaitAudio(usize),
    Sleep(Duration),
    /// Return an error from `recognize`.
    Fail(String),
}

/// Recognizer for tests and demos.
///
/// Runs its script, then keeps consuming input until the stream ends.
/// Counts starts, releases and bytes read so tests can check lifetimes.
#[derive(Debug)]
pub struct ScriptedRecognizer {
    steps: Vec<ScriptStep>,
    session_events: bool,
    start_failure: Option<String>,
    starts: AtomicUsize,
    releases: AtomicUsize,
    bytes_read: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            session_events: true,
            start_failure: None,
            starts: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            bytes_read: AtomicUsize::new(0),
        }
    }

    /// Script for the common case: session start, one final per phrase
    /// after `bytes_per_phrase` bytes of audio each.
    pub fn phrases(phrases: &[&str], bytes_per_phrase: usize) -> Self {
        let mut steps = vec![ScriptStep::Emit(RecognitionEvent::SessionStarted)];
        for phrase in phrases {
            steps.push(ScriptStep::AwaitAudio(bytes_per_phrase));
            steps.push(ScriptStep::Emit(RecognitionEvent::final_text(*phrase)));
        }
        Self::new(steps)
    }

    /// Marks the backend as not reporting session start/stop itself.
    pub fn without_session_events(mut self) -> Self {
        self.session_events = false;
        self
    }

    pub fn with_start_failure(mut self, message: &str) -> Self {
        self.start_failure = Some(message.to_string());
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::SeqCst)
    }

    fn consume(&self, reader: &mut AudioInputReader, limit: usize) -> io::Result<()> {
        let mut buf = [0u8; 4096];
        let mut remaining = limit;
        while remaining > 0 {
            let want = remaining.min(buf.len());
            let n = reader.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            remaining -= n;
            self.bytes_read.fetch_add(n, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl RecognitionBackend for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn emits_session_events(&self) -> bool {
        self.session_events
    }

    fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        match &self.start_failure {
            Some(message) => Err(SpeechError::EngineStart {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn recognize(&self, mut reader: AudioInputReader, events: &EventPublisher) -> Result<()> {
        for step in &self.steps {
            match step {
                ScriptStep::Emit(event) => {
                    events.publish(event.clone());
                }
                ScriptStep::AwaitAudio(bytes) => self.consume(&mut reader, *bytes)?,
                ScriptStep::Sleep(duration) => thread::sleep(*duration),
                ScriptStep::Fail(message) => {
                    return Err(SpeechError::Other(message.clone()));
                }
            }
        }
        self.consume(&mut reader, usize::MAX)?;
        Ok(())
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
