//! X (Twitter) v2 posting client

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::PlatformConfig;
use crate::error::PlatformError;
use crate::platforms::Platform;

/// Client for `POST /2/tweets`
pub struct XClient {
    client: reqwest::Client,
    api_url: String,
    character_limit: usize,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Deserialize)]
struct CreatedTweet {
    id: String,
}

impl XClient {
    /// Create a client for the API at `api_url` (e.g. "https://api.twitter.com")
    pub fn new(api_url: String, character_limit: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            character_limit,
        }
    }

    pub fn from_config(config: &PlatformConfig) -> Self {
        Self::new(config.api_url.clone(), config.character_limit)
    }
}

#[async_trait]
impl Platform for XClient {
    async fn post(&self, access_token: &str, content: &str) -> Result<String, PlatformError> {
        self.validate_content(content)?;

        let response = self
            .client
            .post(format!("{}/2/tweets", self.api_url))
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "text": content }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("X request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status.as_u16(), &body));
        }

        let created: CreateTweetResponse = response.json().await.map_err(|e| {
            PlatformError::Posting(format!("X response parse error: {}", e))
        })?;

        debug!(post_id = %created.data.id, "Post created");
        Ok(created.data.id)
    }

    fn name(&self) -> &str {
        "x"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(self.character_limit)
    }
}

/// Map an unsuccessful HTTP status to a `PlatformError`
///
/// - 401/403 → `Authentication` (token expired or revoked)
/// - 429 → `RateLimit`
/// - 5xx → `Network`
/// - 400/422 → `Validation`
/// - anything else → `Posting`
fn map_status_error(status: u16, body: &str) -> PlatformError {
    match status {
        401 | 403 => PlatformError::Authentication(format!(
            "X rejected the token (HTTP {}): {}",
            status, body
        )),
        429 => PlatformError::RateLimit(format!("X rate limit exceeded: {}", body)),
        500..=599 => {
            PlatformError::Network(format!("X server error (HTTP {}): {}", status, body))
        }
        400 | 422 => PlatformError::Validation(format!(
            "X rejected the content (HTTP {}): {}",
            status, body
        )),
        _ => PlatformError::Posting(format!("X HTTP error {}: {}", status, body)),
    }
}
