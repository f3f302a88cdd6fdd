//! LINE webhook payload: the JSON body POSTed to `/callback`.
//!
//! Only message events carrying text or images are modelled; everything else
//! deserializes into an `Other` variant so new event types never fail parsing.

use serde::Deserialize;

/// Webhook request body.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    /// Bot user id the events were sent to.
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WebhookEvent {
    Message(MessageEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Absent for events that cannot be replied to (e.g. redeliveries in standby mode).
    #[serde(default)]
    pub reply_token: Option<String>,
    pub source: EventSource,
    pub message: MessageContent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageContent {
    Text { id: String, text: String },
    Image { id: String },
    #[serde(other)]
    Other,
}

/// Where the event came from: a user, a group or a room.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

impl EventSource {
    /// Push destination: the sender's user id, else the group or room id.
    pub fn push_target(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or(self.group_id.as_deref())
            .or(self.room_id.as_deref())
            .filter(|s| !s.is_empty())
    }
}
