//! OAuth2 access-token lifecycle
//!
//! [`TokenManager`] hands out a bearer token that is valid right now. It keeps
//! one cached token with an expiry instant and, when the cache is empty or
//! stale, exchanges the refresh token at the authorization server. If the
//! server answers with a different refresh token (rotation) the new value is
//! written to the [`TokenStore`] before it is ever used for another refresh.
//!
//! Refreshes are single-flight: the refresh runs while holding the state
//! lock, and every completed attempt bumps a generation counter. Callers that
//! queued behind an attempt receive its outcome, token or error, instead of
//! issuing a second request.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use libquotecast::auth::{HttpTokenEndpoint, TokenManager};
//! use libquotecast::credentials::{Credentials, EnvFileTokenStore};
//!
//! # async fn example() -> libquotecast::Result<()> {
//! let store = Arc::new(EnvFileTokenStore::new(".env"));
//! let credentials = Credentials::from_env_with_store(store.as_ref())?;
//! let endpoint = Arc::new(HttpTokenEndpoint::new(
//!     "https://api.twitter.com/2/oauth2/token".to_string(),
//! ));
//! let manager = TokenManager::new(credentials, endpoint, store, Duration::from_secs(60));
//!
//! let token = manager.get_access_token().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::credentials::{Credentials, TokenStore, REFRESH_TOKEN_VAR};
use crate::error::TokenRefreshError;

/// Successful refresh-token grant response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Declared lifetime in seconds
    pub expires_in: u64,
    /// Present when the server rotates the refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenGrant {
    pub fn new(access_token: &str, expires_in: u64, refresh_token: Option<&str>) -> Self {
        Self {
            access_token: access_token.to_string(),
            expires_in,
            refresh_token: refresh_token.map(str::to_string),
        }
    }
}

/// Authorization server token endpoint
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange `credentials.refresh_token` for a new access token
    async fn refresh(&self, credentials: &Credentials) -> Result<TokenGrant, TokenRefreshError>;
}

/// Refresh-token grant over HTTP
///
/// Client id and secret go in a basic auth header; the body is
/// form-encoded.
pub struct HttpTokenEndpoint {
    client: reqwest::Client,
    token_url: String,
}

impl HttpTokenEndpoint {
    pub fn new(token_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client, token_url)
    }

    pub fn with_client(client: reqwest::Client, token_url: String) -> Self {
        Self { client, token_url }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn refresh(&self, credentials: &Credentials) -> Result<TokenGrant, TokenRefreshError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", credentials.refresh_token.expose_secret()),
            ("client_id", credentials.client_id.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(
                &credentials.client_id,
                Some(credentials.client_secret.expose_secret()),
            )
            .form(&params)
            .send()
            .await
            .map_err(|e| TokenRefreshError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TokenRefreshError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|e| TokenRefreshError::Malformed(e.to_string()))?;

        if grant.access_token.is_empty() {
            return Err(TokenRefreshError::Malformed(
                "empty access_token".to_string(),
            ));
        }

        Ok(grant)
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

struct AuthState {
    credentials: Credentials,
    cached: Option<CachedToken>,
    /// A rotated refresh token is in memory but not yet on disk
    unpersisted: bool,
    /// Outcome of the most recent attempt, shared with queued callers
    last_outcome: Option<Result<String, TokenRefreshError>>,
}

impl AuthState {
    fn valid_token(&self, now: Instant) -> Option<String> {
        self.cached
            .as_ref()
            .filter(|t| now < t.expires_at)
            .map(|t| t.access_token.clone())
    }
}

/// Owner of the cached access token and the rotating refresh token
pub struct TokenManager {
    endpoint: Arc<dyn TokenEndpoint>,
    store: Arc<dyn TokenStore>,
    safety_margin: Duration,
    state: Mutex<AuthState>,
    /// Completed refresh attempts, successful or not
    generation: AtomicU64,
    refreshes: AtomicU64,
}

impl TokenManager {
    pub fn new(
        credentials: Credentials,
        endpoint: Arc<dyn TokenEndpoint>,
        store: Arc<dyn TokenStore>,
        safety_margin: Duration,
    ) -> Self {
        Self {
            endpoint,
            store,
            safety_margin,
            state: Mutex::new(AuthState {
                credentials,
                cached: None,
                unpersisted: false,
                last_outcome: None,
            }),
            generation: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Build a manager talking to the configured token endpoint
    pub fn from_config(
        config: &Config,
        credentials: Credentials,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let endpoint = Arc::new(HttpTokenEndpoint::new(config.auth.token_url.clone()));
        Self::new(
            credentials,
            endpoint,
            store,
            Duration::from_secs(config.auth.safety_margin_secs),
        )
    }

    /// Return a currently valid access token, refreshing if needed
    ///
    /// # Errors
    ///
    /// Returns `TokenRefreshError` if the refresh fails. In that case the
    /// cached token and refresh token are left exactly as they were. Callers
    /// that were waiting on that refresh receive the same error.
    pub async fn get_access_token(&self) -> Result<String, TokenRefreshError> {
        let observed = self.generation.load(Ordering::Acquire);
        let mut state = self.state.lock().await;

        if let Some(token) = state.valid_token(Instant::now()) {
            return Ok(token);
        }

        // An attempt completed while this caller was queued
        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(outcome) = state.last_outcome.clone() {
                debug!("Sharing outcome of the refresh this call waited on");
                return outcome;
            }
        }

        let outcome = self.refresh_locked(&mut state).await;
        state.last_outcome = Some(outcome.clone());
        self.generation.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Drop the cached access token so the next call refreshes
    ///
    /// Used when the resource server rejects the token before its expiry.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.last_outcome = None;
        if state.cached.take().is_some() {
            debug!("Cached access token invalidated");
        }
    }

    /// Whether a token is cached and not yet past its expiry instant
    pub async fn has_cached_token(&self) -> bool {
        self.state.lock().await.valid_token(Instant::now()).is_some()
    }

    /// Expiry instant of the cached token, if any
    pub async fn expires_at(&self) -> Option<Instant> {
        self.state.lock().await.cached.as_ref().map(|t| t.expires_at)
    }

    /// Number of successful refreshes performed so far
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    async fn refresh_locked(&self, state: &mut AuthState) -> Result<String, TokenRefreshError> {
        if state.unpersisted {
            // The server has already invalidated the token on disk
            self.persist_refresh_token(state.credentials.refresh_token.expose_secret())?;
            state.unpersisted = false;
        }

        debug!("Refreshing access token");
        let issued_at = Instant::now();

        let grant = self
            .endpoint
            .refresh(&state.credentials)
            .await
            .inspect_err(|e| warn!(error = %e, "Access token refresh failed"))?;

        let lifetime = Duration::from_secs(grant.expires_in);
        if lifetime <= self.safety_margin {
            warn!(
                expires_in = grant.expires_in,
                "Token lifetime is shorter than the safety margin"
            );
        }
        let expires_at = issued_at + lifetime.saturating_sub(self.safety_margin);

        if let Some(new_refresh) = grant
            .refresh_token
            .filter(|rt| !rt.is_empty() && state.credentials.is_rotation(rt))
        {
            info!("Authorization server rotated the refresh token");
            state.credentials.refresh_token = SecretString::from(new_refresh.clone());
            if let Err(e) = self.persist_refresh_token(&new_refresh) {
                error!(
                    error = %e,
                    "Rotated refresh token kept in memory only; will retry before next refresh"
                );
                state.unpersisted = true;
            }
        }

        state.cached = Some(CachedToken {
            access_token: grant.access_token.clone(),
            expires_at,
        });
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        info!(
            valid_for_secs = expires_at.saturating_duration_since(issued_at).as_secs(),
            "Access token refreshed"
        );
        Ok(grant.access_token)
    }

    fn persist_refresh_token(&self, value: &str) -> Result<(), TokenRefreshError> {
        self.store
            .persist(REFRESH_TOKEN_VAR, value)
            .map_err(|e| TokenRefreshError::Persist(e.to_string()))?;
        info!(backend = self.store.backend_name(), "Refresh token persisted");
        Ok(())
    }
}

/// Token endpoint that replays scripted responses
///
/// Available in all builds so integration tests can drive [`TokenManager`]
/// without an HTTP server. Once the script runs out it keeps returning the
/// last response.
pub struct ScriptedTokenEndpoint {
    script: std::sync::Mutex<VecDeque<Result<TokenGrant, TokenRefreshError>>>,
    last: std::sync::Mutex<Option<Result<TokenGrant, TokenRefreshError>>>,
    seen: std::sync::Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedTokenEndpoint {
    pub fn new(script: Vec<Result<TokenGrant, TokenRefreshError>>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into()),
            last: std::sync::Mutex::new(None),
            seen: std::sync::Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Always grant `access_token` for `expires_in` seconds, never rotating
    pub fn granting(access_token: &str, expires_in: u64) -> Self {
        Self::new(vec![Ok(TokenGrant::new(access_token, expires_in, None))])
    }

    /// Simulate network latency on every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Refresh tokens presented so far, in order
    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl TokenEndpoint for ScriptedTokenEndpoint {
    async fn refresh(&self, credentials: &Credentials) -> Result<TokenGrant, TokenRefreshError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(credentials.refresh_token.expose_secret().to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last.clone().unwrap_or_else(|| {
                Err(TokenRefreshError::Network("no scripted response".to_string()))
            }),
        }
    }
}
