//! quote-send - Scheduled quote publishing daemon
//!
//! Publishes one translated quote at start-up and then on every fire time
//! of the configured cron schedule. Serves a small liveness endpoint so
//! hosting platforms keep the process awake.

use clap::Parser;
use libquotecast::logging::LoggingConfig;
use libquotecast::{health, Config, QuotecastError, Result, Service, Trigger};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "quote-send")]
#[command(version)]
#[command(about = "Daemon that publishes a translated quote on a schedule")]
#[command(long_about = "\
quote-send - Scheduled quote publishing daemon

DESCRIPTION:
    quote-send draws a random quote, translates it, and publishes it to X.
    It runs once at start-up and then on every fire time of the cron
    schedule. Oversize candidates are re-drawn and failed posts are retried
    within fixed budgets; a failed run never stops later runs.

USAGE:
    # Run in foreground (logs to stderr)
    quote-send

    # Publish once and exit
    quote-send --once

    # Use a specific config file, no liveness endpoint
    quote-send --config ./quotecast.toml --no-health

SIGNALS:
    SIGTERM, SIGINT - Shut down (in-flight work is abandoned)

ENVIRONMENT:
    TWITTER_OAUTH2_CLIENT_ID, TWITTER_OAUTH2_CLIENT_ID_SECRET,
    TWITTER_REFRESH_TOKEN, DEEPL_API_KEY   (required; read from .env too)
    QUOTECAST_CONFIG                       config file path
    QUOTECAST_LOG_FORMAT, QUOTECAST_LOG_LEVEL
    PORT                                   liveness endpoint port

EXIT CODES:
    0 - Clean shutdown (or --once run published)
    1 - Runtime error (or --once run failed)
    2 - Configuration or credential error
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", env = "QUOTECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Publish once and exit
    #[arg(long)]
    once: bool,

    /// Do not start the liveness endpoint
    #[arg(long)]
    no_health: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    match run(cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!(error = %e, "quote-send failed");
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    load_dotenv();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let service = Service::from_config(&config)?;
    let trigger = Trigger::from_config(&config.schedule)?;

    if cli.once {
        let outcome = trigger.run_once(&service.pipeline).await;
        println!("{}", outcome.summary());
        return Ok(if outcome.is_success() { 0 } else { 1 });
    }

    info!(schedule = %config.schedule.cron, "quote-send daemon starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    setup_signal_handlers(shutdown_tx)?;

    let health_task = if config.health.enabled && !cli.no_health {
        let addr = config.health_addr();
        let stats = trigger.stats();
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = health::serve(&addr, stats, wait_for_shutdown(rx)).await {
                // The daemon keeps publishing without it
                error!(error = %e, addr = %addr, "Liveness endpoint failed");
            }
        }))
    } else {
        None
    };

    trigger
        .run(&service.pipeline, wait_for_shutdown(shutdown_rx))
        .await;

    if let Some(task) = health_task {
        let _ = task.await;
    }

    info!("quote-send daemon stopped");
    Ok(0)
}

/// Load `.env` from the working directory if present
fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => info!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Ignoring unreadable .env file"),
    }
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Set up signal handlers for shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: watch::Sender<bool>) -> Result<()> {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| QuotecastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    tokio::spawn(async move {
        if let Some(signal) = signals.next().await {
            info!(signal, "Received shutdown signal, stopping...");
            let _ = shutdown.send(true);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: watch::Sender<bool>) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping...");
            let _ = shutdown.send(true);
        }
    });
    Ok(())
}
