//! Outbound message boundary.

use async_trait::async_trait;

/// Reply capability exposed by the chat transport.
///
/// Plain sends respect the transport's per-channel cooldown; priority sends
/// bypass it. `queue_message` reports whether the message was accepted into
/// the transport's outbound queue (`None` when the transport cannot tell).
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, channel: &str, text: &str);

    async fn send_priority_message(&self, channel: &str, text: &str);

    async fn queue_message(&self, channel: &str, text: &str) -> Option<bool>;
}
