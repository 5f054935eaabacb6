//! Inbound webhook events: parse the LINE webhook body and keep the text message events.

use serde::Deserialize;
use serde_json::Value;

/// A text message event from the webhook body, ready to be stored and answered.
#[derive(Debug, Clone)]
pub struct TextMessageEvent {
    pub user_id: String,
    /// Event time in epoch milliseconds, as sent by the platform.
    pub timestamp: i64,
    pub text: String,
    /// Single-use token for the reply API. Absent in hand-built or redelivered payloads.
    pub reply_token: Option<String>,
    /// The event object exactly as received; this is what gets stored.
    pub raw: Value,
}

/// One element of the `events` array, classified by `(type, message.type)`.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    TextMessage(TextMessageEvent),
    /// Any other event (follow, postback, image message, ...). Not stored or answered.
    Other {
        kind: String,
        message_kind: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("request body is not a JSON object")]
    NotAnObject,
    #[error("request body has no events array")]
    MissingEvents,
    #[error("event {index} is malformed: {reason}")]
    InvalidEvent { index: usize, reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextEventFields {
    #[serde(default)]
    reply_token: Option<String>,
    timestamp: i64,
    source: EventSource,
    message: TextMessageFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventSource {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct TextMessageFields {
    text: String,
}

/// Classify one element of the `events` array. `index` is only used in error messages.
pub fn classify_event(index: usize, value: &Value) -> Result<WebhookEvent, ExtractError> {
    let invalid = |reason: &str| ExtractError::InvalidEvent {
        index,
        reason: reason.to_string(),
    };
    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid("missing type"))?;
    if kind != "message" {
        return Ok(WebhookEvent::Other {
            kind: kind.to_string(),
            message_kind: None,
        });
    }
    let message_kind = value
        .get("message")
        .ok_or_else(|| invalid("message event without message"))?
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid("message without type"))?;
    if message_kind != "text" {
        return Ok(WebhookEvent::Other {
            kind: kind.to_string(),
            message_kind: Some(message_kind.to_string()),
        });
    }
    let fields: TextEventFields =
        serde_json::from_value(value.clone()).map_err(|e| invalid(&e.to_string()))?;
    Ok(WebhookEvent::TextMessage(TextMessageEvent {
        user_id: fields.source.user_id,
        timestamp: fields.timestamp,
        text: fields.message.text,
        reply_token: fields.reply_token,
        raw: value.clone(),
    }))
}

/// Parse a webhook body into classified events, in document order.
pub fn parse_webhook(body: &[u8]) -> Result<Vec<WebhookEvent>, ExtractError> {
    let doc: Value = serde_json::from_slice(body)?;
    let obj = doc.as_object().ok_or(ExtractError::NotAnObject)?;
    let events = obj
        .get("events")
        .and_then(|v| v.as_array())
        .ok_or(ExtractError::MissingEvents)?;
    events
        .iter()
        .enumerate()
        .map(|(i, v)| classify_event(i, v))
        .collect()
}

/// Text message events from a webhook body, in document order. Other events are skipped.
pub fn extract_events(body: &[u8]) -> Result<Vec<TextMessageEvent>, ExtractError> {
    let events = parse_webhook(body)?
        .into_iter()
        .filter_map(|e| match e {
            WebhookEvent::TextMessage(t) => Some(t),
            WebhookEvent::Other { kind, message_kind } => {
                log::debug!(
                    "skipping {} event (message type {})",
                    kind,
                    message_kind.as_deref().unwrap_or("-")
                );
                None
            }
        })
        .collect();
    Ok(events)
}
