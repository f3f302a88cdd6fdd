//! Chat channels (LINE).
//!
//! Webhook payload types and signature verification for inbound traffic, and
//! the `Messenger` seam the handler uses for replies, pushes and downloads.

mod line;
mod messenger;
pub mod signature;
mod webhook;

pub use line::{LineClient, LineError};
pub use messenger::{Attachment, Messenger};
pub use webhook::{EventSource, MessageContent, MessageEvent, WebhookEvent, WebhookPayload};
