//! Translator v3 REST backend.

use crate::config::{TranslationConfig, primary_language};
use crate::error::{Result, SpeechError};
use crate::http::HttpBridge;
use crate::translation::TranslationBackend;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct RequestItem<'a> {
    #[serde(rename = "Text")]
    text: &'a str,
}

#[derive(Deserialize)]
struct ResponseItem {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
struct Translation {
    text: String,
}

/// Calls the Translator text API with a subscription key.
pub struct HttpTranslator {
    bridge: HttpBridge,
    endpoint: String,
    key: String,
    region: Option<String>,
}

impl HttpTranslator {
    pub fn new(bridge: HttpBridge, config: &TranslationConfig) -> Result<Self> {
        let key = config
            .key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SpeechError::ConfigInvalidValue {
                key: "translation.key".to_string(),
                message: "required when translation is enabled".to_string(),
            })?;
        Ok(Self {
            bridge,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            key,
            region: config.region.clone(),
        })
    }

    async fn request(&self, text: &str, from: &str, to: &str) -> Result<String> {
        let body = serde_json::to_vec(&[RequestItem { text }])
            .map_err(|e| translation_error(format!("Failed to encode request: {e}")))?;

        let mut request = self
            .bridge
            .client()
            .post(translate_url(&self.endpoint, from, to))
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "application/json")
            .body(body);
        if let Some(region) = &self.region {
            request = request.header("Ocp-Apim-Subscription-Region", region);
        }

        let response = request
            .send()
            .await
            .map_err(|e| translation_error(format!("Request failed: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| translation_error(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(translation_error(format!("Service returned {status}: {text}")));
        }
        parse_response(&text)
    }
}

impl TranslationBackend for HttpTranslator {
    fn translate(&self, text: &str, from: &str, to: &str) -> Result<String> {
        self.bridge.block_on(self.request(text, from, to))
    }
}

fn translation_error(message: String) -> SpeechError {
    SpeechError::Translation { message }
}

/// Request URL; locale tags are reduced to the primary language.
fn translate_url(endpoint: &str, from: &str, to: &str) -> String {
    format!(
        "{endpoint}/translate?api-version=3.0&from={}&to={}",
        primary_language(from),
        primary_language(to)
    )
}

/// Extracts the first translation of the first sentence.
fn parse_response(body: &str) -> Result<String> {
    let items: Vec<ResponseItem> = serde_json::from_str(body)
        .map_err(|e| translation_error(format!("Failed to parse response: {e}")))?;
    items
        .into_iter()
        .next()
        .and_then(|item| item.translations.into_iter().next())
        .map(|t| t.text)
        .ok_or_else(|| translation_error("Response contained no translation".to_string()))
}
