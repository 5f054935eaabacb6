//! LINE Messaging API client: reply endpoint only.

use crate::channels::reply::{ErrorDetail, ReplyError, ReplyMessage, Replier};
use async_trait::async_trait;
use serde::Deserialize;

const LINE_API_BASE: &str = "https://api.line.me";

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

/// Reply client for one channel. Built once at startup and shared across requests.
pub struct LineClient {
    token: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl LineClient {
    /// `api_base` defaults to https://api.line.me when None.
    pub fn new(token: Option<String>, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| LINE_API_BASE.to_string());
        Self {
            token,
            api_base,
            client: reqwest::Client::new(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// POST /v2/bot/message/reply with a single text message.
    pub async fn reply_message(&self, message: &ReplyMessage) -> Result<(), ReplyError> {
        let token = self.token.as_ref().ok_or(ReplyError::NotConfigured)?;
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let body = serde_json::json!({
            "replyToken": message.reply_token,
            "messages": [{ "type": "text", "text": message.text }],
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let request_id = res
                .headers()
                .get("x-line-request-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = res.text().await.unwrap_or_default();
            let parsed: ApiErrorBody = serde_json::from_str(&text).unwrap_or_else(|_| ApiErrorBody {
                message: text,
                details: Vec::new(),
            });
            return Err(ReplyError::Api {
                status,
                message: parsed.message,
                details: parsed.details,
                request_id,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Replier for LineClient {
    async fn reply(&self, message: &ReplyMessage) -> Result<(), ReplyError> {
        LineClient::reply_message(self, message).await
    }
}
