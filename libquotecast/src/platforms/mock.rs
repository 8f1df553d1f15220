//! Mock platform implementation for testing
//!
//! Simulates a posting API that fails a scripted number of times before
//! succeeding (or never succeeds). Call counters live behind `Arc`s so a test
//! can keep a [`MockConfig`] clone after handing the platform to a pipeline.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::PlatformError;
use crate::platforms::Platform;

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,

    /// Character limit for validation
    pub character_limit: Option<usize>,

    /// Number of leading post calls that fail; `None` fails every call
    pub failures_before_success: Option<usize>,

    /// Error returned by failing calls
    pub failure: PlatformError,

    /// Delay before completing a post (simulates network latency)
    pub delay: Duration,

    /// Number of times post has been called
    pub post_call_count: Arc<Mutex<usize>>,

    /// Text of every post call, successful or not
    pub attempted_content: Arc<Mutex<Vec<String>>>,

    /// Access token presented on every post call
    pub tokens_seen: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            character_limit: None,
            failures_before_success: Some(0),
            failure: PlatformError::Network("Mock network failure".to_string()),
            delay: Duration::ZERO,
            post_call_count: Arc::new(Mutex::new(0)),
            attempted_content: Arc::new(Mutex::new(Vec::new())),
            tokens_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockConfig {
    /// Get the number of times post was called
    pub fn post_call_count(&self) -> usize {
        *self.post_call_count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get all content passed to post
    pub fn attempted_content(&self) -> Vec<String> {
        self.attempted_content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get every access token presented
    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform that fails `failures` times, then succeeds
    pub fn flaky(name: &str, failures: usize, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            failures_before_success: Some(failures),
            failure: error,
            ..Default::default()
        })
    }

    /// Create a mock platform that fails every post
    pub fn post_failure(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            failures_before_success: None,
            failure: error,
            ..Default::default()
        })
    }

    /// Create a mock platform with a character limit
    pub fn with_limit(name: &str, limit: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            character_limit: Some(limit),
            ..Default::default()
        })
    }

    /// Shared handle to the counters
    pub fn config(&self) -> MockConfig {
        self.config.clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn post(&self, access_token: &str, content: &str) -> Result<String, PlatformError> {
        let call = {
            let mut count = self
                .config
                .post_call_count
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *count += 1;
            *count
        };
        self.config
            .attempted_content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(content.to_string());
        self.config
            .tokens_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(access_token.to_string());

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        let succeeds = matches!(self.config.failures_before_success, Some(n) if call > n);
        if succeeds {
            Ok(format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4()))
        } else {
            Err(self.config.failure.clone())
        }
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flaky_then_success() {
        let platform = MockPlatform::flaky(
            "mock",
            2,
            PlatformError::Network("reset".to_string()),
        );
        let handle = platform.config();

        assert!(platform.post("t", "a").await.is_err());
        assert!(platform.post("t", "a").await.is_err());
        let id = platform.post("t", "a").await.unwrap();

        assert!(id.starts_with("mock:mock-"));
        assert_eq!(handle.post_call_count(), 3);
        assert_eq!(handle.attempted_content(), vec!["a", "a", "a"]);
    }

    #[tokio::test]
    async fn test_post_failure_never_succeeds() {
        let platform =
            MockPlatform::post_failure("mock", PlatformError::Posting("nope".to_string()));
        for _ in 0..5 {
            assert_eq!(
                platform.post("t", "a").await,
                Err(PlatformError::Posting("nope".to_string()))
            );
        }
    }
}
