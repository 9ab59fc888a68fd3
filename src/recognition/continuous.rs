//! Continuous recognizer built from a voice activity detector and a
//! [`Transcriber`].
//!
//! Audio is read in frame-sized chunks. The detector splits it into
//! utterances; each finished utterance is transcribed and published as a
//! final result (or no-match). A short pre-roll of silence is kept so word
//! onsets are not clipped. End of input flushes the open utterance and
//! reports `Canceled(EndOfStream)`, the way a cloud recognizer does.

use crate::audio::input_buffer::AudioInputReader;
use crate::audio::vad::{Vad, VadConfig, VadEvent, VadState};
use crate::config::RecognitionConfig;
use crate::defaults::{self, SAMPLE_RATE};
use crate::error::{Result, SpeechError};
use crate::logging::LogSink;
use crate::recognition::backend::{EventPublisher, RecognitionBackend};
use crate::recognition::events::{CancellationReason, RecognitionResult};
use crate::stt::transcriber::Transcriber;
use std::collections::VecDeque;
use std::sync::Arc;

const COMPONENT: &str = "recognizer";

/// Tuning for [`ContinuousRecognizer`].
#[derive(Debug, Clone, Copy)]
pub struct ContinuousSettings {
    pub vad: VadConfig,
    pub frame_ms: u32,
    pub pre_speech_ms: u32,
    /// Utterances are cut and finalized at this length.
    pub max_utterance_ms: u32,
    pub emit_partials: bool,
    pub partial_interval_ms: u32,
}

impl Default for ContinuousSettings {
    fn default() -> Self {
        Self::from_config(&RecognitionConfig::default())
    }
}

impl ContinuousSettings {
    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self {
            vad: VadConfig {
                speech_threshold: config.vad_threshold,
                silence_duration_ms: config.silence_duration_ms,
                min_speech_ms: config.min_speech_ms,
            },
            frame_ms: defaults::FRAME_MS,
            pre_speech_ms: defaults::PRE_SPEECH_MS,
            max_utterance_ms: config.max_utterance_ms,
            emit_partials: config.emit_partials,
            partial_interval_ms: config.partial_interval_ms,
        }
    }

    fn samples(ms: u32) -> usize {
        (SAMPLE_RATE as usize / 1000) * ms as usize
    }
}

/// Recognizer that segments speech locally and transcribes each utterance.
pub struct ContinuousRecognizer<T: Transcriber> {
    transcriber: T,
    settings: ContinuousSettings,
    log: Arc<dyn LogSink>,
}

impl<T: Transcriber> ContinuousRecognizer<T> {
    pub fn new(transcriber: T, settings: ContinuousSettings, log: Arc<dyn LogSink>) -> Self {
        Self {
            transcriber,
            settings,
            log,
        }
    }

    fn publish_final(&self, audio: &[i16], events: &EventPublisher) {
        let result = match self.transcriber.transcribe(audio) {
            Ok(result) if !result.is_empty() => RecognitionResult::speech(result.text),
            Ok(_) => RecognitionResult::no_match(),
            Err(e) => {
                self.log
                    .error(COMPONENT, &format!("Transcription failed: {e}"));
                RecognitionResult::no_match()
            }
        };
        events.recognized(result);
    }

    fn publish_partial(&self, audio: &[i16], events: &EventPublisher) {
        match self.transcriber.transcribe(audio) {
            Ok(result) if !result.is_empty() => {
                events.recognizing(result.text);
            }
            Ok(_) => {}
            Err(e) => self
                .log
                .debug(COMPONENT, &format!("Partial transcription failed: {e}")),
        }
    }
}

/// Per-session segmentation state.
struct Segmenter {
    vad: Vad,
    pre_roll: VecDeque<i16>,
    pre_roll_cap: usize,
    utterance: Vec<i16>,
    last_partial_ms: u32,
}

impl Segmenter {
    fn new(settings: &ContinuousSettings) -> Self {
        Self {
            vad: Vad::new(settings.vad, SAMPLE_RATE),
            pre_roll: VecDeque::new(),
            pre_roll_cap: ContinuousSettings::samples(settings.pre_speech_ms),
            utterance: Vec::new(),
            last_partial_ms: 0,
        }
    }

    fn keep_pre_roll(&mut self, chunk: &[i16]) {
        self.pre_roll.extend(chunk);
        while self.pre_roll.len() > self.pre_roll_cap {
            self.pre_roll.pop_front();
        }
    }

    fn take_utterance(&mut self) -> Vec<i16> {
        self.last_partial_ms = 0;
        std::mem::take(&mut self.utterance)
    }
}

impl<T: Transcriber> RecognitionBackend for ContinuousRecognizer<T> {
    fn name(&self) -> &str {
        self.transcriber.model_name()
    }

    fn start(&self) -> Result<()> {
        if !self.transcriber.is_ready() {
            return Err(SpeechError::EngineStart {
                message: format!("transcriber {} is not ready", self.transcriber.model_name()),
            });
        }
        Ok(())
    }

    fn recognize(&self, mut reader: AudioInputReader, events: &EventPublisher) -> Result<()> {
        let settings = &self.settings;
        let mut segmenter = Segmenter::new(settings);
        let mut frame = vec![0i16; ContinuousSettings::samples(settings.frame_ms.max(1))];

        events.session_started();

        loop {
            let n = reader.read_samples(&mut frame)?;
            if n == 0 || events.is_stop_requested() {
                break;
            }
            let chunk = &frame[..n];

            match segmenter.vad.process(chunk) {
                VadEvent::Silence if segmenter.vad.state() == VadState::Idle => {
                    segmenter.keep_pre_roll(chunk);
                }
                VadEvent::SpeechStart => {
                    segmenter.utterance = segmenter.pre_roll.drain(..).collect();
                    segmenter.utterance.extend_from_slice(chunk);
                }
                VadEvent::Speech | VadEvent::Silence => {
                    segmenter.utterance.extend_from_slice(chunk);
                }
                VadEvent::SpeechEnd { speech_ms } => {
                    segmenter.utterance.extend_from_slice(chunk);
                    self.log
                        .trace(COMPONENT, &format!("Utterance ended after {speech_ms}ms"));
                    let audio = segmenter.take_utterance();
                    self.publish_final(&audio, events);
                    continue;
                }
                VadEvent::Discarded { speech_ms } => {
                    self.log.trace(
                        COMPONENT,
                        &format!("Discarded {speech_ms}ms blip below minimum speech length"),
                    );
                    segmenter.take_utterance();
                    continue;
                }
            }

            if segmenter.vad.state() == VadState::Idle {
                continue;
            }

            let utterance_ms = segmenter.vad.utterance_ms();
            if utterance_ms >= settings.max_utterance_ms {
                self.log.debug(
                    COMPONENT,
                    &format!("Utterance reached {utterance_ms}ms, forcing final result"),
                );
                segmenter.vad.reset();
                let audio = segmenter.take_utterance();
                self.publish_final(&audio, events);
            } else if settings.emit_partials
                && utterance_ms.saturating_sub(segmenter.last_partial_ms) >= settings.partial_interval_ms
            {
                segmenter.last_partial_ms = utterance_ms;
                self.publish_partial(&segmenter.utterance, events);
            }
        }

        if !segmenter.utterance.is_empty() && segmenter.vad.has_min_speech() {
            let audio = segmenter.take_utterance();
            self.publish_final(&audio, events);
        }

        if !events.is_stop_requested() {
            events.canceled(CancellationReason::EndOfStream, None, None);
        }
        events.session_stopped();
        Ok(())
    }

    fn release(&self) {
        self.log.debug(
            COMPONENT,
            &format!("Released transcriber {}", self.transcriber.model_name()),
        );
    }
}
