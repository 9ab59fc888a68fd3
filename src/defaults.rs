//! Default configuration constants for speechloop.
//!
//! Shared constants used across the configuration types and the audio
//! components, so the fixed call audio format is defined in one place.

/// Call audio sample rate in Hz.
///
/// The call transport delivers and accepts 16kHz audio. The format is fixed,
/// not negotiated.
pub const SAMPLE_RATE: u32 = 16000;

/// Bits per PCM sample.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Number of audio channels (mono).
pub const CHANNELS: u16 = 1;

/// Bytes per PCM sample.
pub const BYTES_PER_SAMPLE: usize = (BITS_PER_SAMPLE / 8) as usize;

/// Duration of one outbound media buffer in milliseconds.
pub const FRAME_MS: u32 = 20;

/// Timestamp ticks per millisecond (one tick is 100ns).
pub const TICKS_PER_MS: i64 = 10_000;

/// How long `stop()` waits for the recognizer to acknowledge, in milliseconds.
///
/// Also bounds how long a drain waits for an in-flight synthesis worker.
pub const STOP_TIMEOUT_MS: u64 = 5000;

/// Capacity of the recognition event queue.
pub const EVENT_QUEUE: usize = 256;

/// Capacity of the audio input buffer, in inbound frames.
///
/// 500 frames of 20ms is ten seconds of audio before `append_audio` blocks.
pub const AUDIO_BUFFER_FRAMES: usize = 500;

/// Default recognition and synthesis language.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Default synthesis voice.
pub const DEFAULT_VOICE: &str = "en-US-JennyNeural";

/// Greeting spoken when the recognition session starts.
pub const GREETING: &str = "Welcome to the call.";

/// Default endpoint of the translation service.
pub const TRANSLATOR_ENDPOINT: &str = "https://api.cognitive.microsofttranslator.com";

/// Default RMS threshold for the continuous recognizer's voice activity detector.
pub const VAD_THRESHOLD: f32 = 0.02;

/// Trailing silence that ends an utterance, in milliseconds.
pub const SILENCE_DURATION_MS: u32 = 800;

/// Minimum speech duration for an utterance to be transcribed, in milliseconds.
pub const MIN_SPEECH_MS: u32 = 200;

/// Longest utterance before a final result is forced, in milliseconds.
pub const MAX_UTTERANCE_MS: u32 = 15_000;

/// Silence kept ahead of speech onset, in milliseconds.
pub const PRE_SPEECH_MS: u32 = 300;

/// Number of bytes in one PCM frame of `frame_ms` milliseconds.
pub const fn frame_bytes(frame_ms: u32) -> usize {
    (SAMPLE_RATE as usize / 1000) * frame_ms as usize * BYTES_PER_SAMPLE * CHANNELS as usize
}

/// Number of timestamp ticks in `frame_ms` milliseconds.
pub const fn frame_ticks(frame_ms: u32) -> i64 {
    frame_ms as i64 * TICKS_PER_MS
}

/// Converts a sample count at [`SAMPLE_RATE`] to milliseconds.
pub const fn samples_to_ms(samples: usize) -> u32 {
    (samples as u64 * 1000 / SAMPLE_RATE as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bytes_for_20ms() {
        // 320 samples of 2 bytes
        assert_eq!(frame_bytes(20), 640);
        assert_eq!(frame_bytes(FRAME_MS), 640);
    }

    #[test]
    fn test_frame_ticks_for_20ms() {
        assert_eq!(frame_ticks(20), 200_000);
    }

    #[test]
    fn test_samples_to_ms() {
        assert_eq!(samples_to_ms(16000), 1000);
        assert_eq!(samples_to_ms(320), 20);
        assert_eq!(samples_to_ms(0), 0);
    }
}
