//! speechloop - real-time speech loop for live calls
//!
//! Inbound call audio is recognized continuously, optionally translated,
//! synthesized again and re-emitted as fixed-size timestamped media buffers.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod logging;
pub mod recognition;
pub mod session;
pub mod stt;
pub mod synthesis;
pub mod translation;

// Session
pub use session::{
    CollectingListener, EndReason, SessionBuilder, SessionEnd, SessionListener, SpeechSession,
    SpeechSessionState,
};

// Audio
pub use audio::{AudioFrame, MediaBufferFramer, MediaClock, OutboundMediaBuffer, SpeakerContext};

// Seams (recognize → translate → synthesize)
pub use recognition::{RecognitionBackend, RecognitionEngine, RecognitionEvent};
pub use synthesis::{SynthesisBackend, SynthesisEngine};
pub use translation::{TranslationBackend, TranslationGateway};

// Error handling
pub use error::{Result, SpeechError};

// Config and logging
pub use config::Config;
pub use logging::{LogLevel, LogSink, MemorySink, TracingSink};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
