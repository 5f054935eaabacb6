//! Relay HTTP server: webhook route plus a health probe on a single port.

use crate::channels::SIGNATURE_HEADER;
use crate::config::Config;
use crate::gateway::handler::{handle_webhook, RelayState, WebhookOutcome};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

/// Build the router: `GET /` health and `POST {gateway.webhookPath}` webhook.
/// The path was normalized when `state` was built.
pub fn router(state: RelayState) -> Router {
    let webhook_path = state.config.gateway.webhook_path.clone();
    Router::new()
        .route("/", get(health_http))
        .route(&webhook_path, post(line_webhook))
        .with_state(state)
}

/// Run the relay server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C). Clients are built once here and shared by all requests.
/// Fails before binding when the webhook path or timezone is invalid.
pub async fn run_relay(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let state = RelayState::from_config(config)?;
    log::info!(
        "storing events in container {} as {}/... ({} time)",
        state.config.storage.container,
        state.partitions.system_name,
        state.partitions.zone.name()
    );
    let webhook_path = state.config.gateway.webhook_path.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("relay listening on {} (webhook {})", bind_addr, webhook_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server exited")?;
    log::info!("relay stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST webhook — verifies X-Line-Signature, stores text message events, replies.
async fn line_webhook(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookOutcome {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    handle_webhook(&state, signature, &body).await
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<RelayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}
