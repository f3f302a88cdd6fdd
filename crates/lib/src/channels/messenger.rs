//! Messenger trait: the outbound side of a chat channel as seen by the handler.

use async_trait::async_trait;

/// Binary attachment downloaded from the platform.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    /// Content type reported by the platform (e.g. "image/jpeg").
    pub content_type: String,
}

/// Reply, push and content download. Implemented by the LINE client; tests use recording fakes.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Answer an event through its single-use reply token.
    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), String>;
    /// Deliver a text to a user, group or room id. Usable after the reply token expired.
    async fn push_text(&self, to: &str, text: &str) -> Result<(), String>;
    /// Download the binary content of a message (image, video, file).
    async fn fetch_content(&self, message_id: &str) -> Result<Attachment, String>;
}
