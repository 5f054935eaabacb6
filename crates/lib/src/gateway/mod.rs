//! Gateway: the HTTP side of the relay.
//!
//! Single port serves the LINE webhook and a health probe. Each webhook request is verified,
//! parsed once, stored event by event, and acknowledged through the reply API.

mod handler;
mod server;

pub use handler::{handle_webhook, RelayState, WebhookOutcome};
pub use server::{router, run_relay};
