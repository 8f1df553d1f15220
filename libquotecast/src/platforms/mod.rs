//! Posting API abstraction
//!
//! A [`Platform`] publishes one text post with a bearer token supplied by the
//! caller. Token ownership stays with [`crate::auth::TokenManager`]; platforms
//! never cache credentials.
//!
//! # Examples
//!
//! ```no_run
//! use libquotecast::platforms::{Platform, x::XClient};
//!
//! # async fn example(token: &str) -> Result<(), libquotecast::error::PlatformError> {
//! let platform = XClient::new("https://api.twitter.com".to_string(), 280);
//!
//! platform.validate_content("Hola")?;
//! let post_id = platform.post(token, "Hola").await?;
//! println!("Posted: {}", post_id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::PlatformError;

pub mod x;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Length of `content` as the posting API counts it
pub fn content_length(content: &str) -> usize {
    content.chars().count()
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// Publish `content` and return the remote post id
    ///
    /// # Errors
    ///
    /// - `PlatformError::Authentication` when the token is rejected (401/403)
    /// - `PlatformError::RateLimit` when throttled (429)
    /// - `PlatformError::Network` for transport failures and 5xx answers
    /// - `PlatformError::Posting` / `Validation` for other rejections
    async fn post(&self, access_token: &str, content: &str) -> Result<String, PlatformError>;

    /// Check content against the platform's rules before any network call
    fn validate_content(&self, content: &str) -> Result<(), PlatformError> {
        if content.trim().is_empty() {
            return Err(PlatformError::Validation(
                "Content cannot be empty".to_string(),
            ));
        }

        if let Some(limit) = self.character_limit() {
            let length = content_length(content);
            if length > limit {
                return Err(PlatformError::Validation(format!(
                    "Content exceeds {}'s {} character limit (current: {} characters)",
                    self.name(),
                    limit,
                    length
                )));
            }
        }

        Ok(())
    }

    /// Lowercase platform identifier
    fn name(&self) -> &str;

    /// Maximum post length, `None` if unlimited
    fn character_limit(&self) -> Option<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPlatform;

    #[test]
    fn test_content_length_counts_chars() {
        assert_eq!(content_length("año"), 3);
        assert_eq!(content_length("— Sócrates"), 10);
    }

    #[test]
    fn test_default_validation() {
        let platform = MockPlatform::with_limit("mock", 5);
        assert!(platform.validate_content("ñañañ").is_ok());
        assert!(matches!(
            platform.validate_content("ñañaña"),
            Err(PlatformError::Validation(_))
        ));
        assert!(platform.validate_content("   ").is_err());
    }
}
