//! LINE channel: webhook signature checks, event extraction, and replies.
//!
//! Inbound bodies are verified and parsed once; the text message events they yield are
//! stored by the gateway and then answered through a [`Replier`].

mod inbound;
mod line;
mod reply;
mod signature;

pub use inbound::{
    classify_event, extract_events, parse_webhook, ExtractError, TextMessageEvent, WebhookEvent,
};
pub use line::LineClient;
pub use reply::{dispatch_replies, ErrorDetail, Replier, ReplyError, ReplyMessage, ACK_PREFIX};
pub use signature::{sign_body, SignatureError, SignatureVerifier, SIGNATURE_HEADER};
