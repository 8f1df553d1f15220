//! Liveness endpoint
//!
//! Hosting platforms that idle quiet processes poll `/ping` to keep the bot
//! awake. `/status` exposes the trigger's run counters.

use axum::{extract::State, response::Html, routing::get, Json, Router};
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::Result;
use crate::trigger::{RunStats, SharedStats};

pub const PING_RESPONSE: &str = "I'm awake! quotecast is running.";

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head><title>quotecast</title></head>
  <body>
    <h1>quotecast</h1>
    <p>Publishing translated quotes on a schedule.</p>
    <p><a href="/ping">/ping</a> &middot; <a href="/status">/status</a></p>
  </body>
</html>
"#;

/// Create the liveness router
pub fn router(stats: SharedStats) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ping", get(ping))
        .route("/status", get(status))
        .with_state(stats)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn ping() -> &'static str {
    info!("Ping received");
    PING_RESPONSE
}

async fn status(State(stats): State<SharedStats>) -> Json<RunStats> {
    Json(stats.read().await.clone())
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve<F>(addr: &str, stats: SharedStats, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, stats, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve_listener<F>(listener: TcpListener, stats: SharedStats, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Liveness endpoint listening on http://{}", addr);
    }

    axum::serve(listener, router(stats))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Liveness endpoint stopped");
    Ok(())
}
