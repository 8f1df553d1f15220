//! Text translation
//!
//! The pipeline only needs "text in, translated text out"; [`DeepLTranslator`]
//! does that against the DeepL v2 REST API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::config::TranslationConfig;
use crate::error::UpstreamFetchError;

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into the target language
    async fn translate(&self, text: &str) -> Result<String, UpstreamFetchError>;
}

/// DeepL REST translator
pub struct DeepLTranslator {
    client: reqwest::Client,
    api_url: String,
    api_key: SecretString,
    source_lang: String,
    target_lang: String,
}

#[derive(Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Deserialize)]
struct DeepLTranslation {
    text: String,
}

impl DeepLTranslator {
    pub fn new(config: &TranslationConfig, api_key: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
        }
    }
}

#[async_trait]
impl Translator for DeepLTranslator {
    async fn translate(&self, text: &str) -> Result<String, UpstreamFetchError> {
        let params = [
            ("text", text),
            ("source_lang", self.source_lang.as_str()),
            ("target_lang", self.target_lang.as_str()),
        ];

        let response = self
            .client
            .post(&self.api_url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("DeepL-Auth-Key {}", self.api_key.expose_secret()),
            )
            .form(&params)
            .send()
            .await
            .map_err(|e| UpstreamFetchError::Translation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamFetchError::Translation(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: DeepLResponse = response
            .json()
            .await
            .map_err(|e| UpstreamFetchError::Translation(format!("bad response: {}", e)))?;

        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| UpstreamFetchError::Translation("empty translations".to_string()))
    }
}
