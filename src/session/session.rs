//! Speech session orchestrator.
//!
//! Threads, in the style of a station pipeline:
//! - the call transport calls [`SpeechSession::append_audio`];
//! - the recognition engine runs its backend on a worker thread;
//! - one dispatcher thread consumes recognition events and is the only
//!   place events turn into state transitions;
//! - one synthesis worker runs translate → synthesize → frame → publish for
//!   one utterance at a time, fed by a bounded(1) job channel.
//!
//! Shared state sits in `SessionCore` behind a mutex that is never held
//! across blocking calls.

use crate::audio::frame::{AudioFrame, OutboundMediaBuffer, SpeakerContext};
use crate::audio::framer::{MediaBufferFramer, MediaClock, SystemMediaClock};
use crate::audio::input_buffer::AudioInputBuffer;
use crate::config::Config;
use crate::error::{Result, SpeechError};
use crate::logging::{LogSink, TracingSink};
use crate::recognition::backend::RecognitionBackend;
use crate::recognition::engine::{EventStream, RecognitionEngine};
use crate::recognition::events::{CancellationReason, RecognitionEvent};
use crate::session::listener::SessionListener;
use crate::session::state::{EndReason, SessionEnd, SpeechSessionState};
use crate::synthesis::{SynthesisBackend, SynthesisEngine, VoiceConfig};
use crate::translation::{TranslationBackend, TranslationGateway};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const COMPONENT: &str = "session";

/// One utterance waiting for synthesis.
struct SynthesisJob {
    text: String,
    translate: bool,
}

struct SessionCore {
    state: SpeechSessionState,
    engine: Option<Arc<RecognitionEngine>>,
    jobs: Option<Sender<SynthesisJob>>,
    worker: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
    speaker: Option<SpeakerContext>,
    /// Earliest timestamp the next utterance may start at.
    next_tick: i64,
    end: Option<Arc<SessionEnd>>,
}

struct Inner {
    config: Config,
    recognizer: Arc<dyn RecognitionBackend>,
    synthesis: SynthesisEngine,
    translation: Option<TranslationGateway>,
    listener: Arc<dyn SessionListener>,
    log: Arc<dyn LogSink>,
    clock: Arc<dyn MediaClock>,
    framer: MediaBufferFramer,
    input: AudioInputBuffer,
    /// Set on shutdown and fatal errors, and once drain stops waiting for the
    /// worker. Nothing is published after it is set.
    cancel: AtomicBool,
    /// Held while checking `cancel` and publishing one buffer.
    publish_gate: Mutex<()>,
    /// Serializes start against drain.
    lifecycle: Mutex<()>,
    core: Mutex<SessionCore>,
    stopped_tx: Mutex<Option<Sender<()>>>,
    stopped_rx: Receiver<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Audio → text → audio loop for one call.
pub struct SpeechSession {
    inner: Arc<Inner>,
}

impl SpeechSession {
    /// Assembles a session from its collaborators.
    ///
    /// Nothing starts until the first [`append_audio`](Self::append_audio).
    pub fn new(
        config: Config,
        recognizer: Arc<dyn RecognitionBackend>,
        synthesis: Arc<dyn SynthesisBackend>,
        translation: Option<Arc<dyn TranslationBackend>>,
        listener: Arc<dyn SessionListener>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self::with_clock(
            config,
            recognizer,
            synthesis,
            translation,
            listener,
            log,
            Arc::new(SystemMediaClock),
        )
    }

    pub(crate) fn with_clock(
        config: Config,
        recognizer: Arc<dyn RecognitionBackend>,
        synthesis: Arc<dyn SynthesisBackend>,
        translation: Option<Arc<dyn TranslationBackend>>,
        listener: Arc<dyn SessionListener>,
        log: Arc<dyn LogSink>,
        clock: Arc<dyn MediaClock>,
    ) -> Self {
        if config.translation_required() && translation.is_none() {
            log.warn(
                COMPONENT,
                "Languages differ but no translator is configured, speaking recognized text as is",
            );
        }

        let (stopped_tx, stopped_rx) = bounded::<()>(0);
        let inner = Inner {
            synthesis: SynthesisEngine::new(synthesis, VoiceConfig::from_config(&config.synthesis)),
            translation: translation.map(TranslationGateway::new),
            framer: MediaBufferFramer::new(config.session.frame_ms),
            input: AudioInputBuffer::new(config.session.audio_buffer_frames),
            recognizer,
            listener,
            log,
            clock,
            config,
            cancel: AtomicBool::new(false),
            publish_gate: Mutex::new(()),
            lifecycle: Mutex::new(()),
            core: Mutex::new(SessionCore {
                state: SpeechSessionState::Idle,
                engine: None,
                jobs: None,
                worker: None,
                dispatcher: None,
                speaker: None,
                next_tick: 0,
                end: None,
            }),
            stopped_tx: Mutex::new(Some(stopped_tx)),
            stopped_rx,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Feeds one inbound PCM frame.
    ///
    /// The first call starts recognition. Frames are written in arrival
    /// order; write failures are logged, never returned. Frames arriving
    /// after the session stopped are dropped.
    pub fn append_audio(&self, data: &[u8], speaker: Option<SpeakerContext>) {
        let frame = AudioFrame::new(data, speaker);
        let inner = &self.inner;

        let start_needed = {
            let mut core = lock(&inner.core);
            if core.state.is_terminal() {
                drop(core);
                inner.log.debug(
                    COMPONENT,
                    &format!("Dropping {} byte frame, session is stopped", frame.len()),
                );
                return;
            }
            if let Some(speaker) = &frame.speaker
                && core.speaker.as_ref() != Some(speaker)
            {
                inner.log.debug(
                    COMPONENT,
                    &format!(
                        "Unmixed audio received for speaker id: {}, name: {}",
                        speaker.id, speaker.display_name
                    ),
                );
                core.speaker = Some(speaker.clone());
            }
            if core.state == SpeechSessionState::Idle {
                core.state = SpeechSessionState::Starting;
                true
            } else {
                false
            }
        };

        if start_needed && let Err(e) = Inner::start(inner) {
            inner
                .log
                .error(COMPONENT, &format!("Failed to start recognition: {e}"));
            inner.drain(EndReason::EngineFailure, Some(e));
            return;
        }

        if frame.is_empty() {
            return;
        }
        if let Err(e) = inner.input.write(&frame.data) {
            match e {
                SpeechError::StreamClosed => inner
                    .log
                    .debug(COMPONENT, "Input stream closed, dropping frame"),
                other => inner
                    .log
                    .error(COMPONENT, &format!("Failed writing to input stream: {other}")),
            }
        }
    }

    /// Closes the input stream. The recognizer finishes what it has and the
    /// session ends normally.
    pub fn finish_input(&self) {
        let idle = lock(&self.inner.core).state == SpeechSessionState::Idle;
        self.inner.input.close();
        if idle {
            self.inner.drain(EndReason::EndOfStream, None);
        }
    }

    /// Stops recognition, abandons in-flight synthesis and releases every
    /// resource. Idempotent.
    pub fn shutdown(&self) {
        self.inner.drain(EndReason::Shutdown, None);
    }

    pub fn state(&self) -> SpeechSessionState {
        lock(&self.inner.core).state
    }

    /// Blocks until the session reached `Stopped` or `timeout` elapsed.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        matches!(
            self.inner.stopped_rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// How the session ended, once it has.
    pub fn end(&self) -> Option<Arc<SessionEnd>> {
        lock(&self.inner.core).end.clone()
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        self.inner.drain(EndReason::Shutdown, None);
    }
}

impl Inner {
    fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.config.session.stop_timeout_ms)
    }

    /// Starts the engine and the session threads.
    fn start(self: &Arc<Self>) -> Result<()> {
        let _lifecycle = lock(&self.lifecycle);
        if lock(&self.core).state != SpeechSessionState::Starting {
            // Drained before we got here
            return Ok(());
        }

        let reader = self
            .input
            .take_reader()
            .ok_or_else(|| SpeechError::EngineStart {
                message: "input stream reader already taken".to_string(),
            })?;
        let engine = Arc::new(RecognitionEngine::new(
            Arc::clone(&self.recognizer),
            self.config.session.event_queue,
            self.stop_timeout(),
            Arc::clone(&self.log),
        ));
        lock(&self.core).engine = Some(Arc::clone(&engine));

        let events = engine.start(reader)?;

        let (job_tx, job_rx) = bounded::<SynthesisJob>(1);
        let worker = {
            let inner = Arc::clone(self);
            thread::Builder::new()
                .name("session-synthesis".to_string())
                .spawn(move || inner.run_synthesis(job_rx))?
        };
        {
            let mut core = lock(&self.core);
            core.jobs = Some(job_tx);
            core.worker = Some(worker);
            if !engine.emits_session_events() {
                core.state = SpeechSessionState::Listening;
            }
        }

        let dispatcher = {
            let inner = Arc::clone(self);
            thread::Builder::new()
                .name("session-dispatcher".to_string())
                .spawn(move || inner.dispatch(events))?
        };
        lock(&self.core).dispatcher = Some(dispatcher);

        self.log.info(
            COMPONENT,
            &format!("Recognition started with {}", engine.backend_name()),
        );
        Ok(())
    }

    fn dispatch(&self, events: EventStream) {
        for event in events {
            self.handle_event(event);
        }
        // Worker gone without a terminal event reaching us
        self.drain(EndReason::EndOfStream, None);
    }

    fn handle_event(&self, event: RecognitionEvent) {
        {
            let mut core = lock(&self.core);
            if core.state.is_terminal() {
                drop(core);
                self.log.trace(
                    COMPONENT,
                    &format!("Ignoring {} after stop", event.kind()),
                );
                return;
            }
            if core.state == SpeechSessionState::Starting {
                core.state = SpeechSessionState::Listening;
            }
        }

        match event {
            RecognitionEvent::SessionStarted => {
                self.log.info(COMPONENT, "Recognition session started");
                let greeting = self
                    .config
                    .synthesis
                    .greeting
                    .as_deref()
                    .filter(|g| !g.trim().is_empty());
                if self.config.synthesis.enabled
                    && let Some(greeting) = greeting
                {
                    self.submit(SynthesisJob {
                        text: greeting.to_string(),
                        translate: false,
                    });
                }
            }
            RecognitionEvent::Partial { text } => {
                self.log.debug(COMPONENT, &format!("Recognizing: {text}"));
            }
            RecognitionEvent::Final { text, speaker_id } => {
                if text.trim().is_empty() {
                    self.log.debug(COMPONENT, "Ignoring empty final result");
                    return;
                }
                let (name, id) =
                    speaker_label(speaker_id, lock(&self.core).speaker.as_ref());
                self.log.info(
                    COMPONENT,
                    &format!("From={name}, SpeakerId={id}, Text={text}"),
                );
                if self.config.synthesis.enabled {
                    self.submit(SynthesisJob {
                        text,
                        translate: true,
                    });
                }
            }
            RecognitionEvent::NoMatch => {
                self.log
                    .info(COMPONENT, "No match: speech could not be recognized");
            }
            RecognitionEvent::Canceled {
                reason: CancellationReason::Error,
                code,
                details,
            } => {
                self.log.error(
                    COMPONENT,
                    &format!(
                        "Recognition canceled: code={code:?}, details={}",
                        details.as_deref().unwrap_or("none")
                    ),
                );
                self.drain(
                    EndReason::Canceled,
                    Some(SpeechError::SessionCanceled {
                        reason: CancellationReason::Error,
                        code,
                        details,
                    }),
                );
            }
            RecognitionEvent::Canceled { reason, .. } => {
                self.log
                    .info(COMPONENT, &format!("Recognition canceled: reason={reason:?}"));
                let end = match reason {
                    CancellationReason::CancelledByUser => EndReason::Shutdown,
                    _ => EndReason::EndOfStream,
                };
                self.drain(end, None);
            }
            RecognitionEvent::SessionStopped => {
                self.log.info(COMPONENT, "Recognition session stopped");
                self.drain(EndReason::EndOfStream, None);
            }
        }
    }

    /// Admits a job if no synthesis is in flight. Newer utterances are
    /// dropped while one is playing.
    fn submit(&self, job: SynthesisJob) {
        let mut core = lock(&self.core);
        match core.state {
            SpeechSessionState::Listening => {}
            SpeechSessionState::Synthesizing => {
                drop(core);
                self.log.warn(
                    COMPONENT,
                    &format!("Synthesis in progress, dropping utterance: {}", job.text),
                );
                return;
            }
            other => {
                drop(core);
                self.log.debug(
                    COMPONENT,
                    &format!("Not synthesizing in state {other}: {}", job.text),
                );
                return;
            }
        }

        let Some(jobs) = core.jobs.as_ref() else {
            return;
        };
        match jobs.try_send(job) {
            Ok(()) => core.state = SpeechSessionState::Synthesizing,
            Err(TrySendError::Full(job)) => {
                drop(core);
                self.log.warn(
                    COMPONENT,
                    &format!("Synthesis queue full, dropping utterance: {}", job.text),
                );
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn run_synthesis(&self, jobs: Receiver<SynthesisJob>) {
        for job in jobs {
            if !self.cancel.load(Ordering::SeqCst) {
                self.speak(job);
            }
            let mut core = lock(&self.core);
            if core.state == SpeechSessionState::Synthesizing {
                core.state = SpeechSessionState::Listening;
            }
        }
    }

    fn speak(&self, job: SynthesisJob) {
        let text = if job.translate {
            self.translate(job.text)
        } else {
            job.text
        };

        let audio = match self.synthesis.synthesize(&text) {
            Ok(audio) => audio,
            Err(e) => {
                self.log.error(COMPONENT, &format!("Synthesis failed: {e}"));
                return;
            }
        };
        if self.cancel.load(Ordering::SeqCst) {
            self.log.debug(
                COMPONENT,
                &format!("Session ended during synthesis, discarding: {text}"),
            );
            return;
        }

        let start_tick = {
            let core = lock(&self.core);
            self.clock.now_ticks().max(core.next_tick)
        };
        let mut frames = self.framer.frame(audio, start_tick);
        let mut sent = 0usize;
        for frame in frames.by_ref() {
            match frame {
                Ok(buffer) => {
                    if !self.publish(buffer) {
                        self.log
                            .debug(COMPONENT, "Abandoning synthesized audio on shutdown");
                        break;
                    }
                    sent += 1;
                }
                Err(e) => {
                    self.log
                        .error(COMPONENT, &format!("Failed reading synthesized audio: {e}"));
                    break;
                }
            }
        }

        {
            let mut core = lock(&self.core);
            core.next_tick = core.next_tick.max(frames.next_tick());
        }
        self.log
            .debug(COMPONENT, &format!("Sent {sent} media buffers for: {text}"));
    }

    /// Hands one buffer to the listener unless the session was canceled.
    fn publish(&self, buffer: OutboundMediaBuffer) -> bool {
        let _gate = lock(&self.publish_gate);
        if self.cancel.load(Ordering::SeqCst) {
            return false;
        }
        self.listener.on_outbound_media(buffer);
        true
    }

    /// Sets `cancel`. Once this returns no further buffer is published.
    fn cancel_publishing(&self) {
        let _gate = lock(&self.publish_gate);
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Translates into the synthesis language when needed. Falls back to the
    /// original text on failure.
    fn translate(&self, text: String) -> String {
        if !self.config.translation_required() {
            return text;
        }
        let Some(gateway) = &self.translation else {
            return text;
        };
        let from = &self.config.recognition.language;
        let to = &self.config.synthesis.language;
        match gateway.translate(&text, from, to) {
            Ok(translated) => {
                self.log
                    .info(COMPONENT, &format!("Translated {from} → {to}: {translated}"));
                translated
            }
            Err(e) => {
                self.log.warn(
                    COMPONENT,
                    &format!("Translation failed, speaking original text: {e}"),
                );
                text
            }
        }
    }

    /// Tears the session down once; later calls return immediately.
    ///
    /// Order: close input, stop the recognizer, close the job channel and
    /// join the worker, join the dispatcher, release synthesis, then report
    /// the end to the listener.
    fn drain(&self, reason: EndReason, error: Option<SpeechError>) {
        let (engine, jobs, worker, dispatcher) = {
            let _lifecycle = lock(&self.lifecycle);
            let mut core = lock(&self.core);
            if core.state.is_terminal() {
                return;
            }
            core.state = SpeechSessionState::Draining;
            (
                core.engine.take(),
                core.jobs.take(),
                core.worker.take(),
                core.dispatcher.take(),
            )
        };
        self.log
            .info(COMPONENT, &format!("Draining session ({reason:?})"));

        if reason != EndReason::EndOfStream {
            self.cancel_publishing();
        }
        self.input.close();

        match engine {
            Some(engine) => {
                if let Err(e) = engine.stop() {
                    self.log
                        .warn(COMPONENT, &format!("Recognizer stop failed: {e}"));
                }
            }
            None => self.recognizer.release(),
        }

        drop(jobs);
        if let Some(worker) = worker {
            self.join_with_deadline(worker, "synthesis worker");
        }
        // A detached worker must not publish past this point
        self.cancel_publishing();
        if let Some(dispatcher) = dispatcher
            && dispatcher.thread().id() != thread::current().id()
        {
            self.join_with_deadline(dispatcher, "dispatcher");
        }

        self.synthesis.release();

        let end = Arc::new(SessionEnd::new(reason, error));
        {
            let mut core = lock(&self.core);
            core.state = SpeechSessionState::Stopped;
            core.end = Some(Arc::clone(&end));
        }
        self.log.info(COMPONENT, "Session stopped");
        self.listener.on_session_ended(&end);
        lock(&self.stopped_tx).take();
    }

    /// Joins `handle`, detaching it after the stop timeout.
    fn join_with_deadline(&self, handle: JoinHandle<()>, name: &str) {
        let deadline = Instant::now() + self.stop_timeout();
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                self.log.warn(
                    COMPONENT,
                    &format!("{name} did not finish in time, detaching"),
                );
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        if handle.join().is_err() {
            self.log.error(COMPONENT, &format!("{name} thread panicked"));
        }
    }
}

/// Display name and id for a recognized utterance.
///
/// A speaker id on the result wins; its name is known only when it matches
/// the most recent speaker context.
fn speaker_label(
    speaker_id: Option<String>,
    current: Option<&SpeakerContext>,
) -> (String, String) {
    const UNKNOWN: &str = "unknown";
    match (speaker_id, current) {
        (Some(id), Some(speaker)) if speaker.id == id => (speaker.display_name.clone(), id),
        (Some(id), _) => (UNKNOWN.to_string(), id),
        (None, Some(speaker)) => (speaker.display_name.clone(), speaker.id.clone()),
        (None, None) => (UNKNOWN.to_string(), UNKNOWN.to_string()),
    }
}

/// Assembles a [`SpeechSession`] from optional parts.
///
/// Recognizer, synthesizer and listener are required. Logging defaults to
/// [`TracingSink`], timestamps to the system clock.
#[derive(Default)]
pub struct SessionBuilder {
    config: Option<Config>,
    recognizer: Option<Arc<dyn RecognitionBackend>>,
    synthesizer: Option<Arc<dyn SynthesisBackend>>,
    translator: Option<Arc<dyn TranslationBackend>>,
    listener: Option<Arc<dyn SessionListener>>,
    log: Option<Arc<dyn LogSink>>,
    clock: Option<Arc<dyn MediaClock>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn RecognitionBackend>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn synthesizer(mut self, synthesizer: Arc<dyn SynthesisBackend>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn translator(mut self, translator: Arc<dyn TranslationBackend>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn MediaClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<SpeechSession> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let recognizer = self.recognizer.ok_or_else(|| missing("recognizer"))?;
        let synthesizer = self.synthesizer.ok_or_else(|| missing("synthesizer"))?;
        let listener = self.listener.ok_or_else(|| missing("listener"))?;
        let log = self.log.unwrap_or_else(|| Arc::new(TracingSink));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemMediaClock));

        Ok(SpeechSession::with_clock(
            config,
            recognizer,
            synthesizer,
            self.translator,
            listener,
            log,
            clock,
        ))
    }
}

fn missing(part: &str) -> SpeechError {
    SpeechError::ConfigInvalidValue {
        key: part.to_string(),
        message: "required to build a session".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemorySink};
    use crate::recognition::scripted::{ScriptStep, ScriptedRecognizer};
    use crate::session::listener::CollectingListener;
    use crate::synthesis::MockSynthesizer;
    use crate::translation::MockTranslator;
    use std::sync::atomic::AtomicI64;

    struct FixedClock(AtomicI64);

    impl MediaClock for FixedClock {
        fn now_ticks(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct Harness {
        session: SpeechSession,
        recognizer: Arc<ScriptedRecognizer>,
        synthesizer: Arc<MockSynthesizer>,
        translator: Arc<MockTranslator>,
        listener: Arc<CollectingListener>,
        log: Arc<MemorySink>,
    }

    fn harness(config: Config, recognizer: ScriptedRecognizer, synthesizer: MockSynthesizer) -> Harness {
        let recognizer = Arc::new(recognizer);
        let synthesizer = Arc::new(synthesizer);
        let translator = Arc::new(MockTranslator::new());
        let listener = Arc::new(CollectingListener::new());
        let log = Arc::new(MemorySink::new());
        let session = SpeechSession::with_clock(
            config,
            recognizer.clone(),
            synthesizer.clone(),
            Some(translator.clone()),
            listener.clone(),
            log.clone(),
            Arc::new(FixedClock(AtomicI64::new(1_000))),
        );
        Harness {
            session,
            recognizer,
            synthesizer,
            translator,
            listener,
            log,
        }
    }

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.synthesis.greeting = None;
        config.session.stop_timeout_ms = 2_000;
        config
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_starts_on_first_frame() {
        let h = harness(
            quiet_config(),
            ScriptedRecognizer::new(vec![ScriptStep::Emit(RecognitionEvent::SessionStarted)]),
            MockSynthesizer::new(),
        );
        assert_eq!(h.session.state(), SpeechSessionState::Idle);
        assert_eq!(h.recognizer.starts(), 0);

        h.session.append_audio(&[0; 640], None);
        assert_eq!(h.recognizer.starts(), 1);
        h.session.append_audio(&[0; 640], None);
        assert_eq!(h.recognizer.starts(), 1);

        h.session.shutdown();
        assert_eq!(h.session.state(), SpeechSessionState::Stopped);
    }

    #[test]
    fn test_backend_without_session_events_listens_after_start() {
        let h = harness(
            quiet_config(),
            ScriptedRecognizer::new(Vec::new()).without_session_events(),
            MockSynthesizer::new(),
        );
        h.session.append_audio(&[0; 640], None);
        assert_eq!(h.session.state(), SpeechSessionState::Listening);
        h.session.shutdown();
    }

    #[test]
    fn test_greeting_is_spoken_untranslated() {
        let mut config = Config::default();
        config.synthesis.language = "de-DE".to_string();
        let h = harness(
            config,
            ScriptedRecognizer::new(vec![ScriptStep::Emit(RecognitionEvent::SessionStarted)]),
            MockSynthesizer::new().with_bytes_per_char(64),
        );

        h.session.append_audio(&[0; 640], None);
        h.session.finish_input();
        assert!(h.session.wait_until_stopped(WAIT));

        assert_eq!(h.synthesizer.requests(), vec!["Welcome to the call."]);
        assert_eq!(h.translator.calls(), 0);
        assert!(h.listener.buffer_count() > 0);
    }

    #[test]
    fn test_text_to_speech_disabled_only_logs() {
        let mut config = quiet_config();
        config.synthesis.enabled = false;
        let h = harness(
            config,
            ScriptedRecognizer::phrases(&["hello"], 640),
            MockSynthesizer::new(),
        );

        h.session.append_audio(&[0; 640], None);
        h.session.finish_input();
        assert!(h.session.wait_until_stopped(WAIT));

        assert!(h.synthesizer.requests().is_empty());
        assert!(h.log.contains(LogLevel::Information, "Text=hello"));
    }

    #[test]
    fn test_speaker_annotates_final_log() {
        let h = harness(
            quiet_config(),
            ScriptedRecognizer::phrases(&["hi"], 640),
            MockSynthesizer::new(),
        );
        h.session
            .append_audio(&[0; 640], Some(SpeakerContext::new("42", "Ada")));
        h.session.finish_input();
        assert!(h.session.wait_until_stopped(WAIT));

        assert!(h.log.contains(LogLevel::Information, "From=Ada, SpeakerId=42, Text=hi"));
    }

    #[test]
    fn test_translation_failure_speaks_original() {
        let mut config = quiet_config();
        config.synthesis.language = "fr-FR".to_string();
        let recognizer = Arc::new(ScriptedRecognizer::phrases(&["hello"], 640));
        let synthesizer = Arc::new(MockSynthesizer::new());
        let listener = Arc::new(CollectingListener::new());
        let log = Arc::new(MemorySink::new());
        let session = SpeechSession::new(
            config,
            recognizer,
            synthesizer.clone(),
            Some(Arc::new(MockTranslator::new().with_failure("quota exceeded"))),
            listener,
            log.clone(),
        );

        session.append_audio(&[0; 640], None);
        session.finish_input();
        assert!(session.wait_until_stopped(WAIT));

        assert_eq!(synthesizer.requests(), vec!["hello"]);
        assert!(log.contains(LogLevel::Warning, "quota exceeded"));
    }

    /// Synthesizer that records the request, then blocks until the gate
    /// sender is dropped or sends.
    struct GatedSynthesizer {
        gate: Receiver<()>,
        inner: MockSynthesizer,
    }

    impl SynthesisBackend for GatedSynthesizer {
        fn synthesize(
            &self,
            text: &str,
            voice: &VoiceConfig,
        ) -> Result<crate::synthesis::AudioStream> {
            let audio = self.inner.synthesize(text, voice);
            self.gate.recv().unwrap_or_default();
            audio
        }
    }

    /// Listener that records the order of media and end notifications.
    #[derive(Default)]
    struct OrderListener {
        seen: Mutex<Vec<&'static str>>,
    }

    impl SessionListener for OrderListener {
        fn on_outbound_media(&self, _buffer: OutboundMediaBuffer) {
            lock(&self.seen).push("media");
        }

        fn on_session_ended(&self, _end: &SessionEnd) {
            lock(&self.seen).push("ended");
        }
    }

    #[test]
    fn test_overlapping_final_is_dropped_with_warning() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![
            ScriptStep::Emit(RecognitionEvent::SessionStarted),
            ScriptStep::Emit(RecognitionEvent::final_text("first")),
            ScriptStep::Emit(RecognitionEvent::final_text("second")),
        ]));
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let synthesizer = Arc::new(GatedSynthesizer {
            gate: gate_rx,
            inner: MockSynthesizer::new(),
        });
        let listener = Arc::new(CollectingListener::new());
        let log = Arc::new(MemorySink::new());
        let session = SpeechSession::new(
            quiet_config(),
            recognizer,
            synthesizer.clone(),
            None,
            listener.clone(),
            log.clone(),
        );

        session.append_audio(&[0; 640], None);
        // First utterance is held inside synthesize while the second arrives
        assert!(wait_for(|| {
            log.contains(LogLevel::Warning, "dropping utterance: second")
        }));
        assert_eq!(session.state(), SpeechSessionState::Synthesizing);
        drop(gate_tx);

        session.finish_input();
        assert!(session.wait_until_stopped(WAIT));
        assert_eq!(synthesizer.inner.requests(), vec!["first"]);
        assert_eq!(listener.buffer_count(), 5);
    }

    #[test]
    fn test_slow_synthesis_never_publishes_after_end() {
        let mut config = quiet_config();
        config.session.stop_timeout_ms = 50;
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![
            ScriptStep::Emit(RecognitionEvent::SessionStarted),
            ScriptStep::Emit(RecognitionEvent::final_text("hello")),
        ]));
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let synthesizer = Arc::new(GatedSynthesizer {
            gate: gate_rx,
            inner: MockSynthesizer::new(),
        });
        let listener = Arc::new(OrderListener::default());
        let log = Arc::new(MemorySink::new());
        let session = SpeechSession::new(
            config,
            recognizer,
            synthesizer.clone(),
            None,
            listener.clone(),
            log.clone(),
        );

        session.append_audio(&[0; 640], None);
        assert!(wait_for(|| synthesizer.inner.requests().len() == 1));
        session.finish_input();
        assert!(session.wait_until_stopped(WAIT));
        assert!(log.contains(LogLevel::Warning, "synthesis worker did not finish in time"));

        // Let the detached worker finish its synthesis call
        drop(gate_tx);
        thread::sleep(Duration::from_millis(100));

        assert_eq!(*lock(&listener.seen), vec!["ended"]);
        assert!(log.contains(LogLevel::Debug, "Session ended during synthesis"));
        assert_eq!(session.state(), SpeechSessionState::Stopped);
    }

    #[test]
    fn test_speaker_label_resolution() {
        let ada = SpeakerContext::new("42", "Ada");
        assert_eq!(
            speaker_label(Some("42".to_string()), Some(&ada)),
            ("Ada".to_string(), "42".to_string())
        );
        assert_eq!(
            speaker_label(Some("7".to_string()), Some(&ada)),
            ("unknown".to_string(), "7".to_string())
        );
        assert_eq!(
            speaker_label(None, Some(&ada)),
            ("Ada".to_string(), "42".to_string())
        );
        assert_eq!(
            speaker_label(None, None),
            ("unknown".to_string(), "unknown".to_string())
        );
    }

    #[test]
    fn test_consecutive_utterances_do_not_overlap() {
        let recognizer = ScriptedRecognizer::phrases(&["ab", "cd"], 640);
        let h = harness(quiet_config(), recognizer, MockSynthesizer::new());

        h.session.append_audio(&[0; 640], None);
        // Let the first utterance play before the second is recognized
        assert!(wait_for(|| {
            h.listener.buffer_count() == 2 && h.session.state() == SpeechSessionState::Listening
        }));
        h.session.append_audio(&[0; 640], None);
        assert!(wait_for(|| h.listener.buffer_count() == 4));
        h.session.finish_input();
        assert!(h.session.wait_until_stopped(WAIT));

        let stamps: Vec<i64> = h.listener.buffers().iter().map(|b| b.timestamp).collect();
        assert_eq!(stamps, vec![1_000, 201_000, 401_000, 601_000]);
    }

    #[test]
    fn test_frames_after_stop_are_ignored() {
        let h = harness(
            quiet_config(),
            ScriptedRecognizer::new(Vec::new()),
            MockSynthesizer::new(),
        );
        h.session.append_audio(&[0; 640], None);
        h.session.shutdown();
        let read_before = h.recognizer.bytes_read();

        h.session.append_audio(&[1; 640], None);
        assert_eq!(h.recognizer.bytes_read(), read_before);
        assert_eq!(h.recognizer.starts(), 1);
        assert!(h.log.contains(LogLevel::Debug, "session is stopped"));
    }

    #[test]
    fn test_engine_start_failure_stops_session() {
        let h = harness(
            quiet_config(),
            ScriptedRecognizer::new(Vec::new()).with_start_failure("bad credentials"),
            MockSynthesizer::new(),
        );
        h.session.append_audio(&[0; 640], None);

        assert_eq!(h.session.state(), SpeechSessionState::Stopped);
        let end = h.session.end().unwrap();
        assert_eq!(end.reason, EndReason::EngineFailure);
        assert_eq!(h.recognizer.releases(), 1);
        assert_eq!(h.synthesizer.releases(), 1);
        assert_eq!(h.listener.ends().len(), 1);
    }

    #[test]
    fn test_shutdown_before_start_releases_once() {
        let h = harness(
            quiet_config(),
            ScriptedRecognizer::new(Vec::new()),
            MockSynthesizer::new(),
        );
        h.session.shutdown();
        h.session.shutdown();
        assert_eq!(h.recognizer.releases(), 1);
        assert_eq!(h.synthesizer.releases(), 1);
        assert_eq!(h.listener.ends().len(), 1);
        assert!(h.session.wait_until_stopped(Duration::from_millis(10)));
    }

    #[test]
    fn test_builder_requires_parts() {
        let result = SessionBuilder::new()
            .recognizer(Arc::new(ScriptedRecognizer::new(Vec::new())))
            .listener(Arc::new(CollectingListener::new()))
            .build();
        assert!(matches!(
            result,
            Err(SpeechError::ConfigInvalidValue { ref key, .. }) if key == "synthesizer"
        ));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = Config::default();
        config.session.frame_ms = 0;
        let result = SessionBuilder::new()
            .config(config)
            .recognizer(Arc::new(ScriptedRecognizer::new(Vec::new())))
            .synthesizer(Arc::new(MockSynthesizer::new()))
            .listener(Arc::new(CollectingListener::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_warns_when_translator_missing() {
        let mut config = quiet_config();
        config.synthesis.language = "de-DE".to_string();
        let log = Arc::new(MemorySink::new());
        let session = SessionBuilder::new()
            .config(config)
            .recognizer(Arc::new(ScriptedRecognizer::new(Vec::new())))
            .synthesizer(Arc::new(MockSynthesizer::new()))
            .listener(Arc::new(CollectingListener::new()))
            .log(log.clone())
            .build()
            .unwrap();
        assert_eq!(session.state(), SpeechSessionState::Idle);
        assert!(log.contains(LogLevel::Warning, "no translator"));
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}
