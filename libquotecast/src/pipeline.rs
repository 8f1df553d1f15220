//! Bounded-retry publish pipeline
//!
//! One invocation moves through `Assembling → LengthCheck → Publishing` and
//! ends in a terminal [`PublishOutcome`]. Two independent budgets apply:
//!
//! - **length retries**: an oversize candidate is discarded and a new one is
//!   assembled from a fresh quote. The same counter absorbs upstream fetch
//!   failures, which are also re-rolled with a new quote.
//! - **publish retries**: a failed post is retried after a fixed delay with
//!   the *same* candidate text.
//!
//! Every failure is returned as a typed outcome; nothing here panics or exits.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::auth::TokenManager;
use crate::config::Config;
use crate::error::{PlatformError, TokenRefreshError, UpstreamFetchError};
use crate::platforms::{content_length, Platform};

/// Candidate text and the id of the quote it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub quote_id: String,
    pub text: String,
}

/// Producer of fresh candidate texts
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Assemble a new candidate from a quote whose id is not in `rejected`
    ///
    /// Returns `UpstreamFetchError::Exhausted` when no such quote exists.
    async fn next_candidate(&self, rejected: &HashSet<String>)
        -> Result<Draft, UpstreamFetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub character_limit: usize,
    pub max_length_retries: u32,
    pub max_publish_retries: u32,
    pub retry_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            character_limit: 280,
            max_length_retries: 10,
            max_publish_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            character_limit: config.platform.character_limit,
            max_length_retries: config.pipeline.max_length_retries,
            max_publish_retries: config.pipeline.max_publish_retries,
            retry_delay: Duration::from_secs(config.pipeline.retry_delay_secs),
        }
    }
}

/// Why an invocation ended without publishing
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// Every assembled candidate was over the limit
    CandidateTooLong { attempts: u32 },
    /// Every publish attempt failed; carries the last error
    PublishExhausted {
        attempts: u32,
        last_error: PlatformError,
    },
    TokenRefresh(TokenRefreshError),
    /// The length budget ran out on a failed quote or translation fetch
    UpstreamFetch(UpstreamFetchError),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::CandidateTooLong { attempts } => {
                write!(f, "candidate too long after {} attempts", attempts)
            }
            FailureReason::PublishExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "publish failed after {} attempts: {}",
                attempts, last_error
            ),
            FailureReason::TokenRefresh(e) => write!(f, "token refresh failed: {}", e),
            FailureReason::UpstreamFetch(e) => write!(f, "upstream fetch failed: {}", e),
        }
    }
}

/// Terminal result of one pipeline invocation
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    Succeeded {
        post_id: String,
        text: String,
        /// Candidates discarded before this one
        length_retries: u32,
        publish_attempts: u32,
    },
    Failed {
        reason: FailureReason,
        length_retries: u32,
        publish_attempts: u32,
    },
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PublishOutcome::Succeeded { .. })
    }

    /// One-line description for logs and the status endpoint
    pub fn summary(&self) -> String {
        match self {
            PublishOutcome::Succeeded { post_id, .. } => format!("published {}", post_id),
            PublishOutcome::Failed { reason, .. } => format!("failed: {}", reason),
        }
    }
}

/// A length-valid candidate and the length retries it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub length_retries: u32,
}

/// Draw candidates until one fits in `limit` characters
///
/// Each oversize candidate or failed fetch uses one of `max_retries` slots.
/// A quote rejected as oversize is never drawn again in the same call. On
/// failure returns the reason for the last rejection and the number of slots
/// used.
pub async fn assemble_candidate(
    source: &dyn CandidateSource,
    limit: usize,
    max_retries: u32,
) -> Result<Candidate, (FailureReason, u32)> {
    let mut retries = 0;
    let mut rejected = HashSet::new();

    loop {
        let rejection = match source.next_candidate(&rejected).await {
            Ok(Draft { quote_id, text }) => {
                let length = content_length(&text);
                if length <= limit {
                    debug!(length, limit, retries, "Candidate accepted");
                    return Ok(Candidate {
                        text,
                        length_retries: retries,
                    });
                }
                warn!(
                    quote_id = %quote_id,
                    length,
                    limit,
                    "Candidate over the limit, drawing another quote"
                );
                rejected.insert(quote_id);
                FailureReason::CandidateTooLong {
                    attempts: retries + 1,
                }
            }
            Err(UpstreamFetchError::Exhausted) => {
                warn!(rejected = rejected.len(), "Every quote is over the limit");
                return Err((FailureReason::CandidateTooLong { attempts: retries }, retries));
            }
            Err(e) => {
                warn!(error = %e, "Upstream fetch failed, drawing another quote");
                FailureReason::UpstreamFetch(e)
            }
        };

        retries += 1;
        if retries >= max_retries {
            return Err((rejection, retries));
        }
    }
}

pub struct PublishPipeline {
    source: Arc<dyn CandidateSource>,
    tokens: Arc<TokenManager>,
    platform: Arc<dyn Platform>,
    config: PipelineConfig,
}

impl PublishPipeline {
    pub fn new(
        source: Arc<dyn CandidateSource>,
        tokens: Arc<TokenManager>,
        platform: Arc<dyn Platform>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            tokens,
            platform,
            config,
        }
    }

    /// Effective limit: the tighter of the configured and platform limits
    pub fn character_limit(&self) -> usize {
        match self.platform.character_limit() {
            Some(limit) => limit.min(self.config.character_limit),
            None => self.config.character_limit,
        }
    }

    /// Run one full invocation
    pub async fn run(&self) -> PublishOutcome {
        let candidate = match self.assemble().await {
            Ok(candidate) => candidate,
            Err((reason, length_retries)) => {
                error!(reason = %reason, "No publishable candidate");
                return PublishOutcome::Failed {
                    reason,
                    length_retries,
                    publish_attempts: 0,
                };
            }
        };

        self.publish(candidate.text, candidate.length_retries).await
    }

    /// Publish caller-supplied text, skipping assembly
    ///
    /// Oversize text fails immediately since there is nothing to re-roll.
    pub async fn run_with_text(&self, text: String) -> PublishOutcome {
        let length = content_length(&text);
        if length > self.character_limit() {
            warn!(length, limit = self.character_limit(), "Text over the limit");
            return PublishOutcome::Failed {
                reason: FailureReason::CandidateTooLong { attempts: 1 },
                length_retries: 0,
                publish_attempts: 0,
            };
        }
        self.publish(text, 0).await
    }

    /// Assembling and LengthCheck with this pipeline's budget
    pub async fn assemble(&self) -> Result<Candidate, (FailureReason, u32)> {
        assemble_candidate(
            self.source.as_ref(),
            self.character_limit(),
            self.config.max_length_retries,
        )
        .await
    }

    /// Publishing: post the same text until success or budget exhaustion
    async fn publish(&self, text: String, length_retries: u32) -> PublishOutcome {
        let max = self.config.max_publish_retries;
        let platform = self.platform.name().to_string();
        let mut attempts = 0;

        loop {
            let token = match self.tokens.get_access_token().await {
                Ok(token) => token,
                Err(e) => {
                    error!(error = %e, "Cannot publish without an access token");
                    return PublishOutcome::Failed {
                        reason: FailureReason::TokenRefresh(e),
                        length_retries,
                        publish_attempts: attempts,
                    };
                }
            };

            attempts += 1;
            let last_error = match self.platform.post(&token, &text).await {
                Ok(post_id) => {
                    info!(
                        platform = %platform,
                        post_id = %post_id,
                        attempts,
                        length_retries,
                        "Published"
                    );
                    return PublishOutcome::Succeeded {
                        post_id,
                        text,
                        length_retries,
                        publish_attempts: attempts,
                    };
                }
                Err(e) => e,
            };

            if last_error.is_authentication() {
                self.tokens.invalidate().await;
            }

            if attempts >= max {
                error!(
                    platform = %platform,
                    attempts,
                    error = %last_error,
                    "Giving up on this post"
                );
                return PublishOutcome::Failed {
                    reason: FailureReason::PublishExhausted {
                        attempts,
                        last_error,
                    },
                    length_retries,
                    publish_attempts: attempts,
                };
            }

            warn!(
                platform = %platform,
                attempt = attempts,
                max,
                error = %last_error,
                "Publish failed. Retrying in {}s...",
                self.config.retry_delay.as_secs()
            );
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }
}
