//! Cloud text-to-speech REST backend.
//!
//! Sends SSML and asks for raw 16kHz/16-bit/mono PCM, which is exactly the
//! call audio format, so the response body can be framed without decoding.

use crate::config::SpeechServiceConfig;
use crate::error::{Result, SpeechError};
use crate::http::HttpBridge;
use crate::synthesis::{AudioStream, SynthesisBackend, VoiceConfig};
use std::io::Cursor;

const OUTPUT_FORMAT: &str = "raw-16khz-16bit-mono-pcm";
const USER_AGENT: &str = concat!("speechloop/", env!("CARGO_PKG_VERSION"));

pub struct HttpSynthesizer {
    bridge: HttpBridge,
    url: String,
    key: String,
}

impl HttpSynthesizer {
    pub fn new(bridge: HttpBridge, config: &SpeechServiceConfig) -> Result<Self> {
        let key = config
            .key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SpeechError::ConfigInvalidValue {
                key: "speech.key".to_string(),
                message: "required for speech synthesis".to_string(),
            })?;
        Ok(Self {
            bridge,
            url: synthesis_url(&config.region),
            key,
        })
    }

    async fn request(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>> {
        let response = self
            .bridge
            .client()
            .post(&self.url)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .header("User-Agent", USER_AGENT)
            .body(ssml(text, voice))
            .send()
            .await
            .map_err(|e| synthesis_error(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(synthesis_error(format!("Service returned {status}: {body}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| synthesis_error(format!("Failed to read audio: {e}")))?;
        Ok(bytes.to_vec())
    }
}

impl SynthesisBackend for HttpSynthesizer {
    fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<AudioStream> {
        let audio = self.bridge.block_on(self.request(text, voice))?;
        Ok(Box::new(Cursor::new(audio)))
    }
}

fn synthesis_error(message: String) -> SpeechError {
    SpeechError::Synthesis { message }
}

fn synthesis_url(region: &str) -> String {
    format!("https://{region}.tts.speech.microsoft.com/cognitiveservices/v1")
}

fn ssml(text: &str, voice: &VoiceConfig) -> String {
    format!(
        "<speak version='1.0' xml:lang='{lang}'><voice xml:lang='{lang}' name='{name}'>{text}</voice></speak>",
        lang = escape_xml(&voice.language),
        name = escape_xml(&voice.voice),
        text = escape_xml(text),
    )
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
