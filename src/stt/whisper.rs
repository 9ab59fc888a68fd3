//! Whisper transcription backend for the continuous recognizer.
//!
//! Requires the `whisper` feature (and cmake). Without it the type still
//! exists so callers compile, but transcription fails at runtime.

use crate::config::{RecognitionConfig, primary_language};
use crate::error::{Result, SpeechError};
use crate::stt::transcriber::{Transcriber, TranscriptionResult};
use std::path::{Path, PathBuf};

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Settings for [`WhisperTranscriber`].
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub model_path: PathBuf,
    /// Whisper language code ("en", "de", ...).
    pub language: String,
    /// Inference threads; `None` lets whisper decide.
    pub threads: Option<usize>,
}

impl WhisperConfig {
    /// Builds whisper settings from the recognition section.
    ///
    /// The BCP-47 recognition language is reduced to its primary subtag.
    pub fn from_recognition(config: &RecognitionConfig, model_path: &Path) -> Self {
        Self {
            model_path: model_path.to_path_buf(),
            language: primary_language(&config.language),
            threads: config.threads,
        }
    }
}

fn model_name_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Converts 16-bit PCM to the normalized f32 samples whisper expects.
pub fn convert_audio(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

#[cfg(feature = "whisper")]
pub struct WhisperTranscriber {
    context: Mutex<WhisperContext>,
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperTranscriber {
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl WhisperTranscriber {
    /// Loads the model at `config.model_path`.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !config.model_path.exists() {
            return Err(SpeechError::TranscriptionModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }
        let model_name = model_name_of(&config.model_path);

        let mut context_params = WhisperContextParameters::default();
        context_params.flash_attn(true);
        let path = config
            .model_path
            .to_str()
            .ok_or_else(|| SpeechError::Transcription {
                message: "Invalid UTF-8 in model path".to_string(),
            })?;
        let context = WhisperContext::new_with_params(path, context_params).map_err(|e| {
            SpeechError::Transcription {
                message: format!("Failed to load Whisper model: {}", e),
            }
        })?;

        Ok(Self {
            context: Mutex::new(context),
            config,
            model_name,
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperTranscriber {
    pub fn new(config: WhisperConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(SpeechError::TranscriptionModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }
        let model_name = model_name_of(&config.model_path);
        Ok(Self { config, model_name })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(feature = "whisper")]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &[i16]) -> Result<TranscriptionResult> {
        let audio_f32 = convert_audio(audio);

        let context = self
            .context
            .lock()
            .map_err(|e| SpeechError::Transcription {
                message: format!("Failed to acquire context lock: {}", e),
            })?;
        let mut state = context
            .create_state()
            .map_err(|e| SpeechError::Transcription {
                message: format!("Failed to create Whisper state: {}", e),
            })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        if self.config.language.is_empty() {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.config.language));
        }
        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads as i32);
        }
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &audio_f32)
            .map_err(|e| SpeechError::Transcription {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let lang_id = state.full_lang_id_from_state();
        let language = whisper_rs::get_lang_str(lang_id).unwrap_or("").to_string();

        let mut text = String::new();
        let mut confidence_sum = 0.0_f32;
        let mut segments = 0u32;
        for segment in state.as_iter() {
            text.push_str(&segment.to_string());
            confidence_sum += 1.0 - segment.no_speech_probability();
            segments += 1;
        }
        let confidence = if segments > 0 {
            (confidence_sum / segments as f32).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(TranscriptionResult {
            text: text.trim().to_string(),
            language,
            confidence,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "whisper"))]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, _audio: &[i16]) -> Result<TranscriptionResult> {
        Err(SpeechError::Transcription {
            message: "Whisper feature not enabled; rebuild with --features whisper".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        false
    }
}
