//! Quote source and candidate composition
//!
//! A candidate is produced by drawing a random id from the local id list,
//! fetching that quote, translating its text and school concurrently, and
//! formatting the resulting [`QuoteRecord`].

use async_trait::async_trait;
use rand::seq::IteratorRandom;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::content::{self, QuoteRecord, RawQuote};
use crate::error::{ConfigError, Result, UpstreamFetchError};
use crate::pipeline::{CandidateSource, Draft};
use crate::translate::Translator;

/// Read-only list of valid quote identifiers
#[derive(Debug, Clone)]
pub struct QuoteIdCache {
    ids: Vec<String>,
}

impl QuoteIdCache {
    /// Load a JSON array of ids
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is unreadable, is not a JSON array of
    /// strings, or is empty.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let ids: Vec<String> = serde_json::from_str(&content).map_err(|e| {
            ConfigError::Invalid(format!("quote id list {}: {}", path.display(), e))
        })?;
        let cache = Self::from_ids(ids)?;
        debug!(count = cache.len(), path = %path.display(), "Loaded quote ids");
        Ok(cache)
    }

    pub fn from_ids(ids: Vec<String>) -> Result<Self> {
        let ids: Vec<String> = ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(ConfigError::Invalid("quote id list is empty".to_string()).into());
        }
        Ok(Self { ids })
    }

    /// Uniformly random id outside `excluded`, or `None` if all are excluded
    pub fn random_id(&self, excluded: &HashSet<String>) -> Option<&str> {
        self.ids
            .iter()
            .filter(|id| !excluded.contains(id.as_str()))
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch(&self, id: &str) -> std::result::Result<RawQuote, UpstreamFetchError>;
}

/// Philosophers API client (`GET {api_url}/{id}`)
pub struct PhilosophersApi {
    client: reqwest::Client,
    api_url: String,
}

impl PhilosophersApi {
    pub fn new(api_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl QuoteSource for PhilosophersApi {
    async fn fetch(&self, id: &str) -> std::result::Result<RawQuote, UpstreamFetchError> {
        let url = format!("{}/{}", self.api_url, id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| UpstreamFetchError::Quote(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamFetchError::Quote(format!(
                "quote {} returned HTTP {}",
                id,
                status.as_u16()
            )));
        }

        response
            .json::<RawQuote>()
            .await
            .map_err(|e| UpstreamFetchError::Quote(format!("quote {}: {}", id, e)))
    }
}

/// Candidate source backed by the quote API and a translator
pub struct QuoteComposer {
    ids: QuoteIdCache,
    source: Arc<dyn QuoteSource>,
    translator: Arc<dyn Translator>,
    unknown_year: String,
}

impl QuoteComposer {
    pub fn new(
        ids: QuoteIdCache,
        source: Arc<dyn QuoteSource>,
        translator: Arc<dyn Translator>,
        unknown_year: String,
    ) -> Self {
        Self {
            ids,
            source,
            translator,
            unknown_year,
        }
    }

    /// Fetch quote `id` and translate it
    pub async fn compose(&self, id: &str) -> std::result::Result<QuoteRecord, UpstreamFetchError> {
        debug!(quote_id = id, "Fetching quote");
        let raw = self.source.fetch(id).await?;

        let school = async {
            match raw.school_text() {
                Some(school) => self.translator.translate(school).await.map(Some),
                None => Ok(None),
            }
        };
        let (excerpt, school) =
            tokio::try_join!(self.translator.translate(raw.quote.trim()), school)?;

        QuoteRecord::from_raw(&raw, excerpt, school, &self.unknown_year)
    }
}

#[async_trait]
impl CandidateSource for QuoteComposer {
    async fn next_candidate(
        &self,
        rejected: &HashSet<String>,
    ) -> std::result::Result<Draft, UpstreamFetchError> {
        let id = self
            .ids
            .random_id(rejected)
            .ok_or(UpstreamFetchError::Exhausted)?;
        let record = self.compose(id).await?;
        Ok(Draft {
            quote_id: id.to_string(),
            text: content::format(&record),
        })
    }
}
