//! Error types for Quotecast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuotecastError>;

#[derive(Error, Debug)]
pub enum QuotecastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Token refresh error: {0}")]
    TokenRefresh(#[from] TokenRefreshError),

    #[error("Upstream fetch error: {0}")]
    UpstreamFetch(#[from] UpstreamFetchError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Health server error: {0}")]
    Health(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl QuotecastError {
    /// Returns the appropriate exit code for this error
    ///
    /// Startup problems (configuration, missing credentials) exit with 2 so a
    /// supervisor can tell them apart from runtime failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            QuotecastError::InvalidInput(_) => 3,
            QuotecastError::Config(_) => 2,
            QuotecastError::Credential(CredentialError::Missing(_)) => 2,
            QuotecastError::Credential(_) => 1,
            QuotecastError::TokenRefresh(_) => 1,
            QuotecastError::UpstreamFetch(_) => 1,
            QuotecastError::Platform(_) => 1,
            QuotecastError::Health(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Missing required credential: {0}")]
    Missing(String),

    #[error("Token store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the refresh-token grant
///
/// Cloneable so a pipeline outcome can carry it after the manager has
/// already logged it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenRefreshError {
    #[error("authorization server unreachable: {0}")]
    Network(String),

    #[error("authorization server rejected refresh (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("malformed token response: {0}")]
    Malformed(String),

    #[error("rotated refresh token could not be persisted: {0}")]
    Persist(String),
}

/// Failure of the quote source or the translation service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamFetchError {
    #[error("quote lookup failed: {0}")]
    Quote(String),

    #[error("translation failed: {0}")]
    Translation(String),

    /// Every quote the source can offer was already rejected
    #[error("no quote left that has not been rejected")]
    Exhausted,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

impl PlatformError {
    /// Whether the cached access token should be dropped before retrying
    pub fn is_authentication(&self) -> bool {
        matches!(self, PlatformError::Authentication(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = QuotecastError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_missing_credential() {
        let error: QuotecastError =
            CredentialError::Missing("TWITTER_REFRESH_TOKEN".to_string()).into();
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_config_error() {
        let error: QuotecastError = ConfigError::MissingField("quotes.ids_file".to_string()).into();
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_runtime_errors() {
        let refresh: QuotecastError = TokenRefreshError::Network("timeout".to_string()).into();
        assert_eq!(refresh.exit_code(), 1);

        let fetch: QuotecastError = UpstreamFetchError::Quote("404".to_string()).into();
        assert_eq!(fetch.exit_code(), 1);

        let platform: QuotecastError = PlatformError::Network("reset".to_string()).into();
        assert_eq!(platform.exit_code(), 1);

        let io: QuotecastError = CredentialError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ))
        .into();
        assert_eq!(io.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_platform() {
        let error = QuotecastError::Platform(PlatformError::Posting("duplicate".to_string()));
        assert_eq!(format!("{}", error), "Platform error: Posting failed: duplicate");
    }

    #[test]
    fn test_token_refresh_rejected_formatting() {
        let error = TokenRefreshError::Rejected {
            status: 400,
            detail: "invalid_grant".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("HTTP 400"));
        assert!(message.contains("invalid_grant"));
    }

    #[test]
    fn test_error_message_formatting_config() {
        let config_error = ConfigError::MissingField("schedule.cron".to_string());
        let error = QuotecastError::Config(config_error);
        assert_eq!(
            format!("{}", error),
            "Configuration error: Missing required field: schedule.cron"
        );
    }

    #[test]
    fn test_is_authentication() {
        assert!(PlatformError::Authentication("expired".to_string()).is_authentication());
        assert!(!PlatformError::RateLimit("slow down".to_string()).is_authentication());
    }

    #[test]
    fn test_platform_error_clone() {
        // The pipeline keeps the last publish error after logging it
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(original, cloned);
    }
}
