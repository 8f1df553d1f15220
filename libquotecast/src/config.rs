//! Configuration management for Quotecast
//!
//! Settings live in a TOML file; every section has defaults so a missing file
//! or a partial one still yields a usable configuration. Secrets never live
//! here, they come from the environment (see [`crate::credentials`]).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub platform: PlatformConfig,
    pub pipeline: PipelineSettings,
    pub quotes: QuotesConfig,
    pub translation: TranslationConfig,
    pub schedule: ScheduleConfig,
    pub health: HealthConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth2 token endpoint used for the refresh-token grant
    pub token_url: String,
    /// Seconds subtracted from the declared token lifetime
    pub safety_margin_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: "https://api.twitter.com/2/oauth2/token".to_string(),
            safety_margin_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub api_url: String,
    pub character_limit: usize,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.twitter.com".to_string(),
            character_limit: 280,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_length_retries: u32,
    pub max_publish_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_length_retries: 10,
            max_publish_retries: 3,
            retry_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotesConfig {
    pub api_url: String,
    /// JSON array of valid quote identifiers
    pub ids_file: String,
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            api_url: "https://philosophersapi.com/api/quotes".to_string(),
            ids_file: "uuids.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub api_url: String,
    pub source_lang: String,
    pub target_lang: String,
    /// Shown in place of the year when the source has none
    pub unknown_year: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api-free.deepl.com/v2/translate".to_string(),
            source_lang: "EN".to_string(),
            target_lang: "ES".to_string(),
            unknown_year: "Año Desconocido".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds-first cron expression
    pub cron: String,
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 */2 * * *".to_string(),
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// dotenv-style file the rotated refresh token is written to
    pub token_file: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            token_file: ".env".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file at the XDG default path is not an error: the built-in
    /// defaults are used. A path named by `QUOTECAST_CONFIG` must exist.
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path_override() {
            return Self::load_from_path(&path);
        }

        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.platform.character_limit == 0 {
            return Err(
                ConfigError::Invalid("platform.character_limit must be positive".to_string()).into(),
            );
        }
        if self.pipeline.max_length_retries == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_length_retries must be at least 1".to_string(),
            )
            .into());
        }
        if self.pipeline.max_publish_retries == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_publish_retries must be at least 1".to_string(),
            )
            .into());
        }
        if self.quotes.ids_file.trim().is_empty() {
            return Err(ConfigError::MissingField("quotes.ids_file".to_string()).into());
        }
        cron::Schedule::from_str(&self.schedule.cron).map_err(|e| {
            ConfigError::Invalid(format!("schedule.cron '{}': {}", self.schedule.cron, e))
        })?;
        Ok(())
    }

    /// Address for the liveness endpoint
    ///
    /// A `PORT` environment variable (as set by most hosting platforms)
    /// overrides the configured port.
    pub fn health_addr(&self) -> String {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(self.health.port);
        format!("{}:{}", self.health.host, port)
    }

    /// Token file path with `~` expanded
    pub fn token_file_path(&self) -> PathBuf {
        expand_path(&self.credentials.token_file)
    }

    /// Quote id list path with `~` expanded
    pub fn ids_file_path(&self) -> PathBuf {
        expand_path(&self.quotes.ids_file)
    }
}

fn config_path_override() -> Option<PathBuf> {
    std::env::var("QUOTECAST_CONFIG")
        .ok()
        .filter(|path| !path.trim().is_empty())
        .map(|path| expand_path(&path))
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Some(path) = config_path_override() {
        return Ok(path);
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("quotecast").join("config.toml"))
}
