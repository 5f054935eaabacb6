//! Reply dispatch: acknowledge stored text messages through the platform's reply API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channels::inbound::TextMessageEvent;

/// Prefix of every acknowledgment; the original message text follows on the next line.
pub const ACK_PREFIX: &str = "Message processed:\n";

/// One text reply bound to the event's reply token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessage {
    pub reply_token: String,
    pub text: String,
}

impl ReplyMessage {
    /// Acknowledgment for a processed message: "Message processed:\n{text}".
    pub fn acknowledge(reply_token: impl Into<String>, original_text: &str) -> Self {
        Self {
            reply_token: reply_token.into(),
            text: format!("{}{}", ACK_PREFIX, original_text),
        }
    }
}

/// One entry of the `details` array in a LINE API error body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub property: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("channel access token not configured")]
    NotConfigured,
    #[error("reply request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("messaging API returned {status}: {message}")]
    Api {
        status: u16,
        message: String,
        details: Vec<ErrorDetail>,
        request_id: Option<String>,
    },
}

/// Sends replies to the messaging platform.
#[async_trait]
pub trait Replier: Send + Sync {
    async fn reply(&self, message: &ReplyMessage) -> Result<(), ReplyError>;
}

/// Reply to each event in order. Failures are logged and never returned: the webhook
/// response does not depend on them. Returns how many replies were accepted.
pub async fn dispatch_replies(replier: &dyn Replier, events: &[TextMessageEvent]) -> usize {
    let mut sent = 0;
    for event in events {
        log::info!("User {} wrote: {}", event.user_id, event.text);
        let Some(ref token) = event.reply_token else {
            log::warn!("event from {} has no reply token, not replying", event.user_id);
            continue;
        };
        let message = ReplyMessage::acknowledge(token.as_str(), &event.text);
        match replier.reply(&message).await {
            Ok(()) => sent += 1,
            Err(ReplyError::Api {
                status,
                message,
                details,
                request_id,
            }) => {
                log::error!(
                    "Got exception from LINE Messaging API: {} (status {}, request id {})",
                    message,
                    status,
                    request_id.as_deref().unwrap_or("-")
                );
                for d in details {
                    log::error!("  {}: {}", d.property, d.message);
                }
            }
            Err(e) => log::error!("reply to {} failed: {}", event.user_id, e),
        }
    }
    sent
}
