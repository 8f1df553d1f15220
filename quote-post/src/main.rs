//! quote-post - Publish a single translated quote and exit

use clap::Parser;
use libquotecast::logging::{LogFormat, LoggingConfig};
use libquotecast::pipeline::{assemble_candidate, PipelineConfig, PublishOutcome};
use libquotecast::service::quote_composer;
use libquotecast::{Config, QuotecastError, Result, Service};
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "quote-post")]
#[command(version)]
#[command(about = "Publish a single translated quote and exit", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", env = "QUOTECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Print a length-valid candidate without publishing
    #[arg(long, conflicts_with = "text")]
    dry_run: bool,

    /// Publish this text instead of drawing a quote
    #[arg(long, value_name = "TEXT")]
    text: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "error" };
    LoggingConfig::new(LogFormat::Text, level.to_string(), cli.verbose).init();

    match run(cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let json = match cli.format.as_str() {
        "text" => false,
        "json" => true,
        other => {
            return Err(QuotecastError::InvalidInput(format!(
                "Invalid format '{}'. Valid options: text, json",
                other
            )))
        }
    };

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!(error = %e, "Ignoring unreadable .env file");
        }
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    if cli.dry_run {
        return dry_run(&config, json).await;
    }

    if let Some(text) = &cli.text {
        if text.trim().is_empty() {
            return Err(QuotecastError::InvalidInput(
                "Text cannot be empty".to_string(),
            ));
        }
    }

    let service = Service::from_config(&config)?;
    let outcome = match cli.text {
        Some(text) => service.pipeline.run_with_text(text).await,
        None => service.pipeline.run().await,
    };

    print_outcome(&outcome, json);
    Ok(if outcome.is_success() { 0 } else { 1 })
}

async fn dry_run(config: &Config, json: bool) -> Result<i32> {
    let composer = quote_composer(config)?;
    let pipeline = PipelineConfig::from_config(config);

    match assemble_candidate(
        &composer,
        pipeline.character_limit,
        pipeline.max_length_retries,
    )
    .await
    {
        Ok(candidate) => {
            if json {
                let output = serde_json::json!({
                    "status": "dry_run",
                    "text": candidate.text,
                    "length": candidate.text.chars().count(),
                    "length_retries": candidate.length_retries,
                });
                println!("{}", output);
            } else {
                println!("{}", candidate.text);
            }
            Ok(0)
        }
        Err((reason, retries)) => {
            if json {
                let output = serde_json::json!({
                    "status": "failed",
                    "reason": reason.to_string(),
                    "length_retries": retries,
                });
                println!("{}", output);
            } else {
                eprintln!("No candidate: {}", reason);
            }
            Ok(1)
        }
    }
}

fn print_outcome(outcome: &PublishOutcome, json: bool) {
    match outcome {
        PublishOutcome::Succeeded {
            post_id,
            text,
            length_retries,
            publish_attempts,
        } => {
            if json {
                let output = serde_json::json!({
                    "status": "published",
                    "post_id": post_id,
                    "text": text,
                    "length_retries": length_retries,
                    "publish_attempts": publish_attempts,
                });
                println!("{}", output);
            } else {
                println!("{}", post_id);
            }
        }
        PublishOutcome::Failed {
            reason,
            length_retries,
            publish_attempts,
        } => {
            if json {
                let output = serde_json::json!({
                    "status": "failed",
                    "reason": reason.to_string(),
                    "length_retries": length_retries,
                    "publish_attempts": publish_attempts,
                });
                println!("{}", output);
            } else {
                eprintln!("Failed: {}", reason);
            }
        }
    }
}
