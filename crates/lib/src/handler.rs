//! Event dispatch and message handling.
//!
//! Text messages get a canned reply. Images are acknowledged through the reply token right
//! away, then downloaded, analyzed, and the answer is pushed in chunks. Reply tokens expire
//! long before a slow analysis returns, hence reply for the ack and push for the result.
//! Failures never escape: each becomes at most one user-visible notice or a log line.

use crate::analysis::{AnalysisError, Analyzer, RAW_RESPONSE_PREVIEW_CHARS};
use crate::channels::{MessageContent, MessageEvent, Messenger, WebhookEvent, WebhookPayload};
use crate::chunk::{chunk_text, truncate_chars, MAX_MESSAGE_CHARS};
use crate::config::MessagesConfig;
use std::sync::Arc;

/// Routes webhook events to the text and image handlers.
#[derive(Clone)]
pub struct Handler {
    messenger: Arc<dyn Messenger>,
    analyzer: Arc<dyn Analyzer>,
    messages: Arc<MessagesConfig>,
}

impl Handler {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        analyzer: Arc<dyn Analyzer>,
        messages: MessagesConfig,
    ) -> Self {
        Self {
            messenger,
            analyzer,
            messages: Arc::new(messages),
        }
    }

    /// Handle every event in order. One event's failure does not affect the next.
    pub async fn dispatch(&self, payload: WebhookPayload) {
        log::debug!(
            "dispatching {} event(s) for {}",
            payload.events.len(),
            payload.destination.as_deref().unwrap_or("-")
        );
        for event in &payload.events {
            self.handle_event(event).await;
        }
    }

    pub async fn handle_event(&self, event: &WebhookEvent) {
        let WebhookEvent::Message(ev) = event else {
            log::debug!("ignoring non-message event");
            return;
        };
        match &ev.message {
            MessageContent::Text { id, .. } => {
                log::info!("text message {}", id);
                self.handle_text(ev).await;
            }
            MessageContent::Image { id } => {
                log::info!("image message {}", id);
                self.handle_image(ev, id).await;
            }
            MessageContent::Other => log::debug!("ignoring unsupported message type"),
        }
    }

    async fn handle_text(&self, ev: &MessageEvent) {
        let Some(token) = ev.reply_token.as_deref() else {
            log::debug!("text message without reply token; nothing to do");
            return;
        };
        if let Err(e) = self
            .messenger
            .reply_text(token, &self.messages.text_reply)
            .await
        {
            log::warn!("text reply failed: {}", e);
        }
    }

    async fn handle_image(&self, ev: &MessageEvent, message_id: &str) {
        let Some(target) = ev.source.push_target() else {
            log::warn!(
                "image message {} has no user, group or room id; cannot deliver a result",
                message_id
            );
            return;
        };
        let user = ev.source.user_id.as_deref().unwrap_or(target);

        match ev.reply_token.as_deref() {
            Some(token) => {
                if let Err(e) = self
                    .messenger
                    .reply_text(token, &self.messages.image_received)
                    .await
                {
                    log::warn!("acknowledgement for image {} failed: {}", message_id, e);
                }
            }
            None => log::debug!("image message {} without reply token; skipping ack", message_id),
        }

        let image = match self.messenger.fetch_content(message_id).await {
            Ok(image) => image,
            Err(e) => {
                log::error!("downloading image {} failed: {}", message_id, e);
                self.push(target, &self.messages.download_failed).await;
                return;
            }
        };

        let texts = match self.analyzer.analyze(user, &image).await {
            Ok(Some(answer)) => {
                log::info!(
                    "analysis of image {} returned {} characters",
                    message_id,
                    answer.chars().count()
                );
                chunk_text(&answer, MAX_MESSAGE_CHARS)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            }
            Ok(None) => {
                log::warn!("analysis of image {} returned no answer", message_id);
                vec![self.messages.no_answer.clone()]
            }
            Err(e) => {
                log::error!("analysis of image {} failed: {}", message_id, e);
                vec![self.failure_notice(&e)]
            }
        };

        for text in &texts {
            if !self.push(target, text).await {
                break;
            }
        }
    }

    /// One notice, never longer than a single LINE message.
    fn failure_notice(&self, err: &AnalysisError) -> String {
        let notice = match err {
            AnalysisError::Parse { raw } => format!(
                "{}: {}",
                self.messages.malformed_response,
                truncate_chars(raw, RAW_RESPONSE_PREVIEW_CHARS)
            ),
            other => format!("{}: {}", self.messages.analysis_failed, other),
        };
        truncate_chars(&notice, MAX_MESSAGE_CHARS).to_string()
    }

    /// Push one text; logs and returns false on failure.
    async fn push(&self, to: &str, text: &str) -> bool {
        match self.messenger.push_text(to, text).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("push to {} failed: {}", to, e);
                false
            }
        }
    }
}
