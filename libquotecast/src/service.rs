//! Wiring shared by the binaries
//!
//! Builds the quote composer, token manager, posting client and pipeline from
//! a [`Config`] and the process environment. Required credentials are checked
//! first so a misconfigured deployment fails before any network call.

use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

use crate::auth::TokenManager;
use crate::config::Config;
use crate::credentials::{Credentials, EnvFileTokenStore, TRANSLATION_KEY_VAR};
use crate::error::{CredentialError, Result};
use crate::pipeline::{PipelineConfig, PublishPipeline};
use crate::platforms::x::XClient;
use crate::quotes::{PhilosophersApi, QuoteComposer, QuoteIdCache};
use crate::translate::DeepLTranslator;

/// Translation API key from the environment
pub fn translation_key() -> Result<SecretString> {
    std::env::var(TRANSLATION_KEY_VAR)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| CredentialError::Missing(TRANSLATION_KEY_VAR.to_string()).into())
}

/// Candidate source for the configured quote and translation APIs
pub fn quote_composer(config: &Config) -> Result<QuoteComposer> {
    let api_key = translation_key()?;
    let ids = QuoteIdCache::load(&config.ids_file_path())?;

    Ok(QuoteComposer::new(
        ids,
        Arc::new(PhilosophersApi::new(config.quotes.api_url.clone())),
        Arc::new(DeepLTranslator::new(&config.translation, api_key)),
        config.translation.unknown_year.clone(),
    ))
}

/// Fully wired publishing service
pub struct Service {
    pub pipeline: PublishPipeline,
    pub tokens: Arc<TokenManager>,
}

impl Service {
    /// # Errors
    ///
    /// `CredentialError::Missing` when any OAuth2 variable or the translation
    /// key is absent; `ConfigError` when the quote id list is unusable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(EnvFileTokenStore::new(config.token_file_path()));
        let credentials = Credentials::from_env_with_store(store.as_ref())?;
        let composer = quote_composer(config)?;

        let tokens = Arc::new(TokenManager::from_config(config, credentials, store));
        let platform = Arc::new(XClient::from_config(&config.platform));
        let pipeline = PublishPipeline::new(
            Arc::new(composer),
            Arc::clone(&tokens),
            platform,
            PipelineConfig::from_config(config),
        );

        info!(
            token_file = %config.token_file_path().display(),
            ids_file = %config.ids_file_path().display(),
            "Publishing service ready"
        );
        Ok(Self { pipeline, tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CLIENT_ID_VAR, CLIENT_SECRET_VAR, REFRESH_TOKEN_VAR};
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        for var in [
            CLIENT_ID_VAR,
            CLIENT_SECRET_VAR,
            REFRESH_TOKEN_VAR,
            TRANSLATION_KEY_VAR,
        ] {
            std::env::remove_var(var);
        }
    }

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.credentials.token_file = dir.path().join(".env").to_string_lossy().into_owned();
        config.quotes.ids_file = dir.path().join("uuids.json").to_string_lossy().into_owned();
        config
    }

    #[test]
    #[serial]
    fn test_missing_credentials_fail_first() {
        clear_env();
        let dir = TempDir::new().unwrap();

        let err = Service::from_config(&config_in(&dir)).err().unwrap();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains(REFRESH_TOKEN_VAR));
    }

    #[test]
    #[serial]
    fn test_missing_translation_key() {
        clear_env();
        std::env::set_var(CLIENT_ID_VAR, "id");
        std::env::set_var(CLIENT_SECRET_VAR, "secret");
        std::env::set_var(REFRESH_TOKEN_VAR, "rt");
        let dir = TempDir::new().unwrap();

        let err = Service::from_config(&config_in(&dir)).err().unwrap();
        clear_env();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains(TRANSLATION_KEY_VAR));
    }

    #[test]
    #[serial]
    fn test_builds_with_stored_refresh_token() {
        clear_env();
        std::env::set_var(CLIENT_ID_VAR, "id");
        std::env::set_var(CLIENT_SECRET_VAR, "secret");
        std::env::set_var(REFRESH_TOKEN_VAR, "rt-env");
        std::env::set_var(TRANSLATION_KEY_VAR, "deepl");
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".env"), "TWITTER_REFRESH_TOKEN=rt-stored\n").unwrap();
        std::fs::write(dir.path().join("uuids.json"), r#"["q-1"]"#).unwrap();

        let service = Service::from_config(&config_in(&dir));
        let refresh = std::env::var(REFRESH_TOKEN_VAR).ok();
        clear_env();

        assert!(service.is_ok());
        assert_eq!(refresh.as_deref(), Some("rt-stored"));
    }
}
