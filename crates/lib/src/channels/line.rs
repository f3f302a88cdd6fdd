//! LINE channel: reply, push and content download via the Messaging API.

use crate::channels::messenger::{Attachment, Messenger};
use crate::config::LineConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("line request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("line api error: {0}")]
    Api(String),
    #[error("line channel access token not configured")]
    MissingToken,
}

/// Client for the LINE Messaging API.
#[derive(Clone)]
pub struct LineClient {
    api_base: String,
    data_api_base: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl LineClient {
    pub fn new(config: &LineConfig) -> Result<Self, LineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            data_api_base: config.data_api_base.trim_end_matches('/').to_string(),
            token: config.channel_access_token.clone(),
            client,
        })
    }

    fn token(&self) -> Result<&str, LineError> {
        self.token.as_deref().ok_or(LineError::MissingToken)
    }

    /// POST /v2/bot/message/reply with text messages (LINE allows up to five per reply).
    pub async fn reply(&self, reply_token: &str, texts: &[&str]) -> Result<(), LineError> {
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let body = json!({
            "replyToken": reply_token,
            "messages": text_messages(texts),
        });
        self.post_json(&url, &body).await
    }

    /// POST /v2/bot/message/push with text messages.
    pub async fn push(&self, to: &str, texts: &[&str]) -> Result<(), LineError> {
        let url = format!("{}/v2/bot/message/push", self.api_base);
        let body = json!({
            "to": to,
            "messages": text_messages(texts),
        });
        self.post_json(&url, &body).await
    }

    /// GET /v2/bot/message/{id}/content on the data API host.
    pub async fn get_content(&self, message_id: &str) -> Result<Attachment, LineError> {
        let url = format!("{}/v2/bot/message/{}/content", self.data_api_base, message_id);
        let res = self
            .client
            .get(&url)
            .bearer_auth(self.token()?)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LineError::Api(format!("content {} {}", status, body)));
        }
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let bytes = res.bytes().await?.to_vec();
        log::debug!(
            "downloaded content for message {}: {} bytes ({})",
            message_id,
            bytes.len(),
            content_type
        );
        Ok(Attachment {
            bytes,
            content_type,
        })
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<(), LineError> {
        let res = self
            .client
            .post(url)
            .bearer_auth(self.token()?)
            .json(body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LineError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

fn text_messages(texts: &[&str]) -> Vec<serde_json::Value> {
    texts
        .iter()
        .map(|t| json!({ "type": "text", "text": t }))
        .collect()
}

#[async_trait]
impl Messenger for LineClient {
    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), String> {
        self.reply(reply_token, &[text]).await.map_err(|e| e.to_string())
    }

    async fn push_text(&self, to: &str, text: &str) -> Result<(), String> {
        self.push(to, &[text]).await.map_err(|e| e.to_string())
    }

    async fn fetch_content(&self, message_id: &str) -> Result<Attachment, String> {
        self.get_content(message_id).await.map_err(|e| e.to_string())
    }
}
