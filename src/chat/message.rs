//! The chat message value object.

use crate::chat::MessageSender;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// What kind of chat event produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Ordinary channel message.
    Privmsg,
    /// Server/channel notice.
    Notice,
    /// CTCP ACTION ("/me").
    Action,
}

/// One inbound chat event, immutable after creation.
///
/// Created by the transport once per event, consumed by at most one team.
/// Cloning is cheap enough for queue retention: the only non-trivial shared
/// part is the optional back-reference to the transport for replies.
#[derive(Clone)]
pub struct ChatMessage {
    pub id: Uuid,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    /// Sender's username, always lowercase.
    pub user: String,
    /// Channel name, always lowercase and `#`-prefixed.
    pub channel: String,
    pub text: String,
    /// Per-protocol metadata (badge lists, mod/subscriber flags, ...).
    pub tags: HashMap<String, String>,
    /// Back-reference to the transport, for replying.
    pub sender: Option<Arc<dyn MessageSender>>,
}

impl ChatMessage {
    /// Build a message, normalizing user and channel casing.
    pub fn new(
        kind: MessageKind,
        user: &str,
        channel: &str,
        text: &str,
        tags: HashMap<String, String>,
    ) -> Self {
        let channel = channel.to_lowercase();
        let channel = if channel.starts_with('#') {
            channel
        } else {
            format!("#{channel}")
        };
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            user: user.to_lowercase(),
            channel,
            text: text.to_string(),
            tags,
            sender: None,
        }
    }

    /// Attach the transport back-reference.
    pub fn with_sender(mut self, sender: Arc<dyn MessageSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// The comma-separated badge list from the tag map, empty if absent.
    pub fn badges(&self) -> &str {
        self.tags.get("badges").map(String::as_str).unwrap_or("")
    }

    /// A tag value, with a fallback for absent keys.
    pub fn tag_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.tags.get(key).map(String::as_str).unwrap_or(default)
    }
}

impl fmt::Debug for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatMessage")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("user", &self.user)
            .field("channel", &self.channel)
            .field("text", &self.text)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}
