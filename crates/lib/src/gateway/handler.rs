//! Webhook request handling: verify, extract once, store each text event, then reply.

use crate::channels::{
    dispatch_replies, extract_events, LineClient, Replier, SignatureVerifier, TextMessageEvent,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{self, AggregatePolicy, Config};
use crate::storage::{store_event, AzureBlobStore, BlobStore, PartitionScheme, PartitionZone};
use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// What the platform sees for one webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Events stored (replies may still have failed).
    Ok,
    /// Body unusable or storage failed.
    Error,
    InvalidSignature,
}

impl WebhookOutcome {
    pub fn status(self) -> StatusCode {
        match self {
            WebhookOutcome::Ok | WebhookOutcome::Error => StatusCode::OK,
            WebhookOutcome::InvalidSignature => StatusCode::BAD_REQUEST,
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            WebhookOutcome::Ok => "OK",
            WebhookOutcome::Error => "ERROR",
            WebhookOutcome::InvalidSignature => "Invalid signature.",
        }
    }
}

impl IntoResponse for WebhookOutcome {
    fn into_response(self) -> Response {
        (self.status(), self.body()).into_response()
    }
}

/// Everything a request needs. Built once per process and cloned into each handler; never mutated.
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<Config>,
    pub verifier: SignatureVerifier,
    pub store: Arc<dyn BlobStore>,
    pub replier: Arc<dyn Replier>,
    pub partitions: PartitionScheme,
    pub clock: Arc<dyn Clock>,
}

impl RelayState {
    /// Production state: Azure blob store, LINE reply client, and the system clock.
    /// Credentials come from the environment or config; missing ones surface on first use.
    pub fn from_config(mut config: Config) -> Result<Self> {
        config::apply_env_overrides(&mut config);
        let store = AzureBlobStore::new(
            config.storage.account_name.clone(),
            config.storage.account_key.clone(),
            config.storage.endpoint.clone(),
            config.storage.container.clone(),
        );
        let replier = LineClient::new(
            config.line.channel_access_token.clone(),
            config.line.api_base.clone(),
        );
        Self::with_backends(config, Arc::new(store), Arc::new(replier), Arc::new(SystemClock))
    }

    /// State with the given backends. `config` is used as given: the environment is not read.
    /// The webhook path is trimmed and must be a non-root absolute path.
    pub fn with_backends(
        mut config: Config,
        store: Arc<dyn BlobStore>,
        replier: Arc<dyn Replier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.gateway.webhook_path = normalize_webhook_path(&config.gateway.webhook_path)?;
        let zone: PartitionZone = config
            .storage
            .timezone
            .parse()
            .context("parsing storage.timezone")?;
        let partitions = PartitionScheme::new(config.storage.system_name.clone(), zone);
        let secret = config
            .line
            .channel_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let verifier = SignatureVerifier::new(secret);
        Ok(Self {
            config: Arc::new(config),
            verifier,
            store,
            replier,
            partitions,
            clock,
        })
    }

    fn aggregate(&self) -> AggregatePolicy {
        self.config.relay.aggregate
    }
}

/// Trimmed webhook route. Rejects paths that are relative or the root (which serves health).
fn normalize_webhook_path(path: &str) -> Result<String> {
    let path = path.trim();
    if !path.starts_with('/') || path == "/" {
        anyhow::bail!(
            "gateway.webhookPath must start with '/' and not be the root path (got {:?})",
            path
        );
    }
    Ok(path.to_string())
}

/// Store every event; returns the events that were written and whether the request counts as stored.
async fn store_events<'a>(
    state: &RelayState,
    events: &'a [TextMessageEvent],
) -> (Vec<&'a TextMessageEvent>, bool) {
    let mut stored = Vec::with_capacity(events.len());
    let mut all_ok = true;
    let mut last_ok = false;
    for event in events {
        let key = state.partitions.key_for(state.clock.now(), event);
        let ok = store_event(state.store.as_ref(), &key, &event.raw).await.is_ok();
        if ok {
            stored.push(event);
        }
        all_ok &= ok;
        last_ok = ok;
    }
    let outcome = match state.aggregate() {
        AggregatePolicy::All => all_ok,
        AggregatePolicy::Last => last_ok,
    };
    (stored, outcome)
}

/// Handle one webhook delivery. Always produces an outcome; nothing here panics or escalates.
pub async fn handle_webhook(
    state: &RelayState,
    signature: Option<&str>,
    body: &[u8],
) -> WebhookOutcome {
    log::info!("Processing request from LINE webhook...");
    log::info!("Request body:\n{}", String::from_utf8_lossy(body));

    if let Err(e) = state.verifier.verify(body, signature) {
        log::error!("Invalid signature. ({})", e);
        return WebhookOutcome::InvalidSignature;
    }

    let events = match extract_events(body) {
        Ok(events) => events,
        Err(e) => {
            log::error!("Error retrieving events!");
            log::error!("{}", e);
            return WebhookOutcome::Error;
        }
    };
    if events.is_empty() {
        log::warn!("no text message events in request, nothing stored");
        return WebhookOutcome::Error;
    }

    let (stored, ok) = store_events(state, &events).await;
    if !ok {
        log::error!(
            "stored {} of {} events, not replying",
            stored.len(),
            events.len()
        );
        return WebhookOutcome::Error;
    }

    let stored: Vec<TextMessageEvent> = stored.into_iter().cloned().collect();
    let sent = dispatch_replies(state.replier.as_ref(), &stored).await;
    log::debug!("replied to {} of {} stored events", sent, stored.len());
    WebhookOutcome::Ok
}
