//! Quotecast - scheduled publishing of translated quotes
//!
//! This library provides the token lifecycle, content assembly and bounded-retry
//! publishing used by the `quote-send` daemon and the `quote-post` one-shot tool.

pub mod auth;
pub mod config;
pub mod content;
pub mod credentials;
pub mod error;
pub mod health;
pub mod logging;
pub mod pipeline;
pub mod platforms;
pub mod quotes;
pub mod service;
pub mod translate;
pub mod trigger;

// Re-export commonly used types
pub use auth::{HttpTokenEndpoint, TokenEndpoint, TokenGrant, TokenManager};
pub use config::Config;
pub use content::QuoteRecord;
pub use credentials::{Credentials, EnvFileTokenStore, MemoryTokenStore, TokenStore};
pub use error::{QuotecastError, Result};
pub use pipeline::{FailureReason, PipelineConfig, PublishOutcome, PublishPipeline};
pub use service::Service;
pub use trigger::{RunStats, Trigger};
