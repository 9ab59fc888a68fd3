//! Speech-to-text backends used by the continuous recognizer.

pub mod transcriber;
pub mod whisper;

pub use transcriber::{MockTranscriber, Transcriber, TranscriptionResult};
pub use whisper::{WhisperConfig, WhisperTranscriber};
