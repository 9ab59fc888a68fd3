//! Voice activity detection over audio time.
//!
//! RMS thresholding plus a small state machine. Durations are measured in
//! samples processed, not wall-clock time, so the detector behaves the same
//! whether audio arrives in real time or faster (file replay, tests).

use crate::defaults;

/// Thresholds for [`Vad`].
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// RMS threshold for detecting speech (0.0 to 1.0).
    pub speech_threshold: f32,
    /// Silence needed after speech before the utterance ends (milliseconds).
    pub silence_duration_ms: u32,
    /// Utterances shorter than this are discarded as noise (milliseconds).
    pub min_speech_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            speech_threshold: defaults::VAD_THRESHOLD,
            silence_duration_ms: defaults::SILENCE_DURATION_MS,
            min_speech_ms: defaults::MIN_SPEECH_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    Idle,
    Speaking,
    /// Silence after speech, not yet long enough to end the utterance.
    MaybeSilence,
}

/// Outcome of feeding one chunk of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    Silence,
    SpeechStart,
    Speech,
    /// Utterance ended after `speech_ms` of audio (trailing silence included).
    SpeechEnd { speech_ms: u32 },
    /// Utterance ended but was shorter than `min_speech_ms`.
    Discarded { speech_ms: u32 },
}

/// Voice activity detector state machine.
#[derive(Debug, Clone)]
pub struct Vad {
    config: VadConfig,
    sample_rate: u32,
    state: VadState,
    utterance_samples: usize,
    silence_samples: usize,
}

impl Vad {
    pub fn new(config: VadConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate: sample_rate.max(1),
            state: VadState::Idle,
            utterance_samples: 0,
            silence_samples: 0,
        }
    }

    /// Classifies `samples` and advances the state machine.
    pub fn process(&mut self, samples: &[i16]) -> VadEvent {
        let is_speech = calculate_rms(samples) > self.config.speech_threshold;
        let count = samples.len();

        match self.state {
            VadState::Idle => {
                if is_speech {
                    self.state = VadState::Speaking;
                    self.utterance_samples = count;
                    self.silence_samples = 0;
                    VadEvent::SpeechStart
                } else {
                    VadEvent::Silence
                }
            }
            VadState::Speaking => {
                self.utterance_samples += count;
                if is_speech {
                    VadEvent::Speech
                } else {
                    self.state = VadState::MaybeSilence;
                    self.silence_samples = count;
                    self.end_if_silent_long_enough()
                }
            }
            VadState::MaybeSilence => {
                self.utterance_samples += count;
                if is_speech {
                    self.state = VadState::Speaking;
                    self.silence_samples = 0;
                    VadEvent::Speech
                } else {
                    self.silence_samples += count;
                    self.end_if_silent_long_enough()
                }
            }
        }
    }

    fn end_if_silent_long_enough(&mut self) -> VadEvent {
        if self.ms(self.silence_samples) < self.config.silence_duration_ms {
            return VadEvent::Silence;
        }
        let speech_ms = self.ms(self.utterance_samples);
        let voiced_ms = self.ms(self.utterance_samples - self.silence_samples);
        self.reset();
        if voiced_ms < self.config.min_speech_ms {
            VadEvent::Discarded { speech_ms }
        } else {
            VadEvent::SpeechEnd { speech_ms }
        }
    }

    /// Audio time of the current utterance in milliseconds, 0 when idle.
    pub fn utterance_ms(&self) -> u32 {
        self.ms(self.utterance_samples)
    }

    /// Returns true when enough voiced audio was seen to count as speech.
    pub fn has_min_speech(&self) -> bool {
        self.ms(self.utterance_samples - self.silence_samples) >= self.config.min_speech_ms
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = VadState::Idle;
        self.utterance_samples = 0;
        self.silence_samples = 0;
    }

    fn ms(&self, samples: usize) -> u32 {
        (samples as u64 * 1000 / self.sample_rate as u64) as u32
    }
}

/// Normalized RMS of 16-bit samples: 0.0 is silence, 1.0 full scale.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    // 20ms at 16kHz
    const FRAME: usize = 320;

    fn silence() -> Vec<i16> {
        vec![0; FRAME]
    }

    fn speech() -> Vec<i16> {
        vec![3000; FRAME]
    }

    fn vad(silence_ms: u32, min_speech_ms: u32) -> Vad {
        Vad::new(
            VadConfig {
                speech_threshold: 0.02,
                silence_duration_ms: silence_ms,
                min_speech_ms,
            },
            16_000,
        )
    }

    #[test]
    fn test_rms_silence_is_zero() {
        assert_eq!(calculate_rms(&silence()), 0.0);
        assert_eq!(calculate_rms(&[]), 0.0);
    }

    #[test]
    fn test_rms_full_scale() {
        let rms = calculate_rms(&vec![i16::MAX; 100]);
        assert!((rms - 1.0).abs() < 0.001, "got {rms}");
        assert!(calculate_rms(&vec![i16::MIN; 100]) > 0.99);
    }

    #[test]
    fn test_rms_mixed_sign() {
        let mut mixed = vec![1000i16; 500];
        mixed.extend(vec![-1000i16; 500]);
        let rms = calculate_rms(&mixed);
        assert!(rms > 0.025 && rms < 0.035, "got {rms}");
    }

    #[test]
    fn test_speech_start_and_continue() {
        let mut vad = vad(100, 40);
        assert_eq!(vad.process(&silence()), VadEvent::Silence);
        assert_eq!(vad.state(), VadState::Idle);
        assert_eq!(vad.process(&speech()), VadEvent::SpeechStart);
        assert_eq!(vad.process(&speech()), VadEvent::Speech);
        assert_eq!(vad.state(), VadState::Speaking);
        assert_eq!(vad.utterance_ms(), 40);
    }

    #[test]
    fn test_brief_silence_resumes_speaking() {
        let mut vad = vad(100, 40);
        vad.process(&speech());
        assert_eq!(vad.process(&silence()), VadEvent::Silence);
        assert_eq!(vad.state(), VadState::MaybeSilence);
        assert_eq!(vad.process(&speech()), VadEvent::Speech);
        assert_eq!(vad.state(), VadState::Speaking);
    }

    #[test]
    fn test_ends_after_silence_duration_in_audio_time() {
        let mut vad = vad(100, 40);
        for _ in 0..5 {
            vad.process(&speech());
        }
        // 100ms of silence = 5 frames; the fifth ends the utterance
        for _ in 0..4 {
            assert_eq!(vad.process(&silence()), VadEvent::Silence);
        }
        assert_eq!(
            vad.process(&silence()),
            VadEvent::SpeechEnd { speech_ms: 200 }
        );
        assert_eq!(vad.state(), VadState::Idle);
        assert_eq!(vad.utterance_ms(), 0);
    }

    #[test]
    fn test_short_blip_is_discarded() {
        let mut vad = vad(40, 100);
        vad.process(&speech());
        vad.process(&silence());
        assert_eq!(
            vad.process(&silence()),
            VadEvent::Discarded { speech_ms: 60 }
        );
    }

    #[test]
    fn test_detects_second_utterance_after_end() {
        let mut vad = vad(40, 20);
        vad.process(&speech());
        vad.process(&silence());
        assert!(matches!(vad.process(&silence()), VadEvent::SpeechEnd { .. }));
        assert_eq!(vad.process(&speech()), VadEvent::SpeechStart);
    }

    #[test]
    fn test_min_speech_ignores_trailing_silence() {
        let mut vad = vad(1000, 40);
        vad.process(&speech());
        vad.process(&silence());
        vad.process(&silence());
        assert!(!vad.has_min_speech());
        vad.process(&speech());
        assert!(vad.has_min_speech());
    }
}
