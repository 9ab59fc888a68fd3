//! Session configuration.
//!
//! Supplied once at session construction and never mutated afterwards.

use crate::defaults;
use crate::error::{Result, SpeechError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub speech: SpeechServiceConfig,
    pub recognition: RecognitionConfig,
    pub synthesis: SynthesisConfig,
    pub translation: TranslationConfig,
    pub session: SessionConfig,
}

/// Credentials for the speech service (recognition and synthesis)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechServiceConfig {
    pub key: Option<String>,
    pub region: String,
}

/// Speech recognition configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    pub language: String,
    /// Emit interim `Partial` results while an utterance is in progress.
    pub emit_partials: bool,
    /// Interval between interim results, in milliseconds of speech.
    pub partial_interval_ms: u32,
    pub vad_threshold: f32,
    pub silence_duration_ms: u32,
    pub min_speech_ms: u32,
    pub max_utterance_ms: u32,
    /// Local transcription model used by the continuous recognizer.
    pub model_path: Option<PathBuf>,
    pub threads: Option<usize>,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Speak a response for every recognized phrase.
    pub enabled: bool,
    pub language: String,
    pub voice: String,
    /// Spoken once when recognition starts. `None` disables the greeting.
    pub greeting: Option<String>,
}

/// Text translation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    pub enabled: bool,
    pub key: Option<String>,
    pub region: Option<String>,
    pub endpoint: String,
}

/// Session tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Duration of one outbound media buffer.
    pub frame_ms: u32,
    /// Upper bound for recognizer stop and synthesis worker release.
    pub stop_timeout_ms: u64,
    /// Capacity of the recognition event queue.
    pub event_queue: usize,
    /// Capacity of the inbound audio buffer in frames; writes block when full.
    pub audio_buffer_frames: usize,
}

impl Default for SpeechServiceConfig {
    fn default() -> Self {
        Self {
            key: None,
            region: "westeurope".to_string(),
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            emit_partials: false,
            partial_interval_ms: 1000,
            vad_threshold: defaults::VAD_THRESHOLD,
            silence_duration_ms: defaults::SILENCE_DURATION_MS,
            min_speech_ms: defaults::MIN_SPEECH_MS,
            max_utterance_ms: defaults::MAX_UTTERANCE_MS,
            model_path: None,
            threads: None,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            voice: defaults::DEFAULT_VOICE.to_string(),
            greeting: Some(defaults::GREETING.to_string()),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key: None,
            region: None,
            endpoint: defaults::TRANSLATOR_ENDPOINT.to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_ms: defaults::FRAME_MS,
            stop_timeout_ms: defaults::STOP_TIMEOUT_MS,
            event_queue: defaults::EVENT_QUEUE,
            audio_buffer_frames: defaults::AUDIO_BUFFER_FRAMES,
        }
    }
}

/// Compares two BCP-47 language tags, ignoring case.
pub fn same_language(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Lowercase primary subtag of a language tag: `"en-US"` becomes `"en"`.
pub fn primary_language(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SpeechError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                SpeechError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(SpeechError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SPEECHLOOP_SPEECH_KEY → speech.key
    /// - SPEECHLOOP_SPEECH_REGION → speech.region
    /// - SPEECHLOOP_TRANSLATOR_KEY → translation.key
    /// - SPEECHLOOP_RECOGNITION_LANGUAGE → recognition.language
    /// - SPEECHLOOP_SYNTHESIS_LANGUAGE → synthesis.language
    /// - SPEECHLOOP_VOICE → synthesis.voice
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = non_empty_env("SPEECHLOOP_SPEECH_KEY") {
            self.speech.key = Some(key);
        }
        if let Some(region) = non_empty_env("SPEECHLOOP_SPEECH_REGION") {
            self.speech.region = region;
        }
        if let Some(key) = non_empty_env("SPEECHLOOP_TRANSLATOR_KEY") {
            self.translation.key = Some(key);
        }
        if let Some(language) = non_empty_env("SPEECHLOOP_RECOGNITION_LANGUAGE") {
            self.recognition.language = language;
        }
        if let Some(language) = non_empty_env("SPEECHLOOP_SYNTHESIS_LANGUAGE") {
            self.synthesis.language = language;
        }
        if let Some(voice) = non_empty_env("SPEECHLOOP_VOICE") {
            self.synthesis.voice = voice;
        }
        self
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.recognition.language.trim().is_empty() {
            return Err(invalid("recognition.language", "must not be empty"));
        }
        if self.synthesis.language.trim().is_empty() {
            return Err(invalid("synthesis.language", "must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.recognition.vad_threshold) {
            return Err(invalid("recognition.vad_threshold", "must be within 0.0..=1.0"));
        }
        if self.recognition.max_utterance_ms <= self.recognition.min_speech_ms {
            return Err(invalid(
                "recognition.max_utterance_ms",
                "must be greater than min_speech_ms",
            ));
        }
        if self.session.frame_ms == 0 || self.session.frame_ms > 1000 {
            return Err(invalid("session.frame_ms", "must be within 1..=1000"));
        }
        if self.session.stop_timeout_ms == 0 {
            return Err(invalid("session.stop_timeout_ms", "must be positive"));
        }
        if self.session.event_queue == 0 {
            return Err(invalid("session.event_queue", "must be positive"));
        }
        if self.session.audio_buffer_frames == 0 {
            return Err(invalid("session.audio_buffer_frames", "must be positive"));
        }
        Ok(())
    }

    /// Returns true when recognized text must be translated before synthesis.
    pub fn translation_required(&self) -> bool {
        self.translation.enabled
            && !same_language(&self.recognition.language, &self.synthesis.language)
    }

    /// Copy of the configuration with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.speech.key.is_some() {
            copy.speech.key = Some("***".to_string());
        }
        if copy.translation.key.is_some() {
            copy.translation.key = Some("***".to_string());
        }
        copy
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/speechloop/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("speechloop").join("config.toml"))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn invalid(key: &str, message: &str) -> SpeechError {
    SpeechError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
