//! Cron-driven invocation of the publish pipeline
//!
//! The trigger runs the pipeline once at start (when configured) and then at
//! every fire time of a seconds-first cron expression. Invocations are
//! serial: the next fire time is computed only after the previous invocation
//! has reached a terminal outcome. Outcomes are folded into [`RunStats`],
//! which the liveness endpoint reports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ScheduleConfig;
use crate::error::{ConfigError, Result};
use crate::pipeline::{PublishOutcome, PublishPipeline};

/// Counters over all invocations since process start
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
    pub last_post_id: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            runs: 0,
            successes: 0,
            failures: 0,
            last_run_at: None,
            last_outcome: None,
            last_post_id: None,
            next_run_at: None,
        }
    }
}

impl RunStats {
    pub fn record(&mut self, outcome: &PublishOutcome, at: DateTime<Utc>) {
        self.runs += 1;
        self.last_run_at = Some(at);
        self.last_outcome = Some(outcome.summary());
        match outcome {
            PublishOutcome::Succeeded { post_id, .. } => {
                self.successes += 1;
                self.last_post_id = Some(post_id.clone());
            }
            PublishOutcome::Failed { .. } => self.failures += 1,
        }
    }
}

pub type SharedStats = Arc<RwLock<RunStats>>;

pub struct Trigger {
    schedule: cron::Schedule,
    run_on_start: bool,
    stats: SharedStats,
}

impl Trigger {
    /// Parse `expression` (seconds-first cron syntax)
    pub fn new(expression: &str, run_on_start: bool) -> Result<Self> {
        let schedule = cron::Schedule::from_str(expression)
            .map_err(|e| ConfigError::Invalid(format!("cron '{}': {}", expression, e)))?;
        Ok(Self {
            schedule,
            run_on_start,
            stats: Arc::new(RwLock::new(RunStats::default())),
        })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Self::new(&config.cron, config.run_on_start)
    }

    /// Handle to the live counters
    pub fn stats(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    /// First fire time strictly after `after`
    pub fn next_fire_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }

    /// Run one invocation and record its outcome
    pub async fn run_once(&self, pipeline: &PublishPipeline) -> PublishOutcome {
        let started = Utc::now();
        info!("Publish run starting");
        let outcome = pipeline.run().await;

        let mut stats = self.stats.write().await;
        stats.record(&outcome, started);
        info!(
            runs = stats.runs,
            successes = stats.successes,
            failures = stats.failures,
            outcome = %outcome.summary(),
            "Publish run finished"
        );
        outcome
    }

    /// Run until `shutdown` resolves
    ///
    /// In-flight work is abandoned on shutdown.
    pub async fn run<F>(&self, pipeline: &PublishPipeline, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = self.run_forever(pipeline) => {
                warn!("Cron schedule has no further fire times");
            }
            _ = shutdown => {
                info!("Shutdown requested, stopping trigger");
            }
        }
    }

    async fn run_forever(&self, pipeline: &PublishPipeline) {
        if self.run_on_start {
            self.run_once(pipeline).await;
        }

        loop {
            let now = Utc::now();
            let Some(next) = self.next_fire_after(&now) else {
                return;
            };
            self.stats.write().await.next_run_at = Some(next);

            let delay = (next - now).to_std().unwrap_or_default();
            info!(next_run = %next.to_rfc3339(), "Waiting {}s for next run", delay.as_secs());
            tokio::time::sleep(delay).await;

            self.run_once(pipeline).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ScriptedTokenEndpoint, TokenManager};
    use crate::credentials::{Credentials, MemoryTokenStore};
    use crate::error::{PlatformError, UpstreamFetchError};
    use crate::pipeline::{CandidateSource, Draft, FailureReason, PipelineConfig};
    use crate::platforms::mock::{MockConfig, MockPlatform};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use std::time::Duration;

    struct Fixed;

    #[async_trait]
    impl CandidateSource for Fixed {
        async fn next_candidate(
            &self,
            _rejected: &HashSet<String>,
        ) -> std::result::Result<Draft, UpstreamFetchError> {
            Ok(Draft {
                quote_id: "fixed".to_string(),
                text: "Cita fija.".to_string(),
            })
        }
    }

    fn pipeline(platform: MockPlatform) -> PublishPipeline {
        let tokens = TokenManager::new(
            Credentials::new("id".to_string(), "secret".to_string(), "rt".to_string()),
            Arc::new(ScriptedTokenEndpoint::granting("at", 7200)),
            Arc::new(MemoryTokenStore::new()),
            Duration::from_secs(60),
        );
        PublishPipeline::new(
            Arc::new(Fixed),
            Arc::new(tokens),
            Arc::new(platform),
            PipelineConfig::default(),
        )
    }

    #[test]
    fn test_invalid_expression() {
        assert!(Trigger::new("0 */2 * *", true).is_err());
    }

    #[test]
    fn test_every_two_hours() {
        let trigger = Trigger::new("0 0 */2 * * *", true).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap();
        assert_eq!(
            trigger.next_fire_after(&after),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_on_start_then_shutdown() {
        // Yearly schedule: only the startup run happens before shutdown
        let trigger = Trigger::new("0 0 0 1 1 *", true).unwrap();
        let platform = MockPlatform::success("mock");
        let handle: MockConfig = platform.config();
        let pipeline = pipeline(platform);

        trigger
            .run(&pipeline, tokio::time::sleep(Duration::from_secs(1)))
            .await;

        let stats = trigger.stats();
        let stats = stats.read().await;
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.successes, 1);
        assert!(stats.next_run_at.is_some());
        assert_eq!(handle.post_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_run_on_start() {
        let trigger = Trigger::new("0 0 0 1 1 *", false).unwrap();
        let platform = MockPlatform::success("mock");
        let handle = platform.config();
        let pipeline = pipeline(platform);

        trigger
            .run(&pipeline, tokio::time::sleep(Duration::from_secs(1)))
            .await;

        assert_eq!(trigger.stats().read().await.runs, 0);
        assert_eq!(handle.post_call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_later_runs() {
        let trigger = Trigger::new("0 0 0 1 1 *", false).unwrap();
        let pipeline = pipeline(MockPlatform::post_failure(
            "mock",
            PlatformError::Network("down".to_string()),
        ));

        let first = trigger.run_once(&pipeline).await;
        let second = trigger.run_once(&pipeline).await;

        assert!(matches!(
            first,
            PublishOutcome::Failed {
                reason: FailureReason::PublishExhausted { .. },
                ..
            }
        ));
        assert!(!second.is_success());

        let stats = trigger.stats();
        let stats = stats.read().await;
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.failures, 2);
        assert!(stats
            .last_outcome
            .as_deref()
            .is_some_and(|o| o.starts_with("failed: publish failed after 3 attempts")));
    }
}
