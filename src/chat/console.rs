//! Console transport harness.
//!
//! Feeds stdin lines through the router so the whole pipeline can be
//! exercised without a network transport. One message per line:
//!
//! ```text
//! [#channel] [user:] text
//! ```
//!
//! Channel defaults to the first configured team channel, user to
//! `console`. Lines may also carry IRC-style tags up front as
//! `@key=value;key=value`.

use crate::chat::{ChatMessage, MessageKind};
use crate::state::AppState;
use crate::team::route_message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

const DEFAULT_USER: &str = "console";

/// Parse one console line into a chat message.
///
/// Returns `None` for blank lines.
pub fn parse_line(line: &str, default_channel: &str) -> Option<ChatMessage> {
    let mut rest = line.trim();
    if rest.is_empty() {
        return None;
    }

    let mut tags = HashMap::new();
    if let Some(tag_block) = rest.strip_prefix('@') {
        let (raw_tags, remainder) = tag_block.split_once(' ')?;
        for pair in raw_tags.split(';') {
            if let Some((key, value)) = pair.split_once('=') {
                tags.insert(key.to_string(), value.to_string());
            }
        }
        rest = remainder.trim_start();
    }

    let channel = if rest.starts_with('#') {
        let (channel, remainder) = rest.split_once(' ')?;
        rest = remainder.trim_start();
        channel.to_string()
    } else {
        default_channel.to_string()
    };

    let (user, text) = match rest.split_once(':') {
        Some((user, text)) if !user.contains(' ') && !user.is_empty() => {
            (user, text.trim_start())
        }
        _ => (DEFAULT_USER, rest),
    };
    if text.is_empty() {
        return None;
    }

    Some(ChatMessage::new(
        MessageKind::Privmsg,
        user,
        &channel,
        text,
        tags,
    ))
}

/// Read stdin until EOF, routing every parsed line. Intended to be
/// spawned next to the team loops.
pub async fn run(state: Arc<AppState>) -> std::io::Result<()> {
    let default_channel = state
        .teams()
        .first()
        .and_then(|team| team.channels.iter().next().cloned())
        .unwrap_or_else(|| "#console".to_string());
    info!(channel = %default_channel, "console transport ready, type actions to route them");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line, &default_channel) {
            Some(msg) => route_message(&state, &msg),
            None => debug!(line = %line, "console line ignored"),
        }
    }
    info!("console transport closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_uses_defaults() {
        let msg = parse_line("+left", "#chan").unwrap();
        assert_eq!(msg.user, "console");
        assert_eq!(msg.channel, "#chan");
        assert_eq!(msg.text, "+left");
    }

    #[test]
    fn test_user_prefix() {
        let msg = parse_line("alice: +jump 300", "#chan").unwrap();
        assert_eq!(msg.user, "alice");
        assert_eq!(msg.text, "+jump 300");
    }

    #[test]
    fn test_channel_and_user() {
        let msg = parse_line("#other bob: +left", "#chan").unwrap();
        assert_eq!(msg.channel, "#other");
        assert_eq!(msg.user, "bob");
        assert_eq!(msg.text, "+left");
    }

    #[test]
    fn test_tags_block() {
        let msg = parse_line(
            "@badges=predictions/blue-1;subscriber=1 carol: +left",
            "#chan",
        )
        .unwrap();
        assert_eq!(msg.badges(), "predictions/blue-1");
        assert_eq!(msg.tag_or("subscriber", ""), "1");
        assert_eq!(msg.user, "carol");
    }

    #[test]
    fn test_blank_line_is_ignored() {
        assert!(parse_line("   ", "#chan").is_none());
        assert!(parse_line("", "#chan").is_none());
    }

    #[test]
    fn test_text_with_colon_inside_is_not_a_user_prefix() {
        let msg = parse_line("look at this: thing", "#chan").unwrap();
        assert_eq!(msg.user, "console");
        assert_eq!(msg.text, "look at this: thing");
    }
}
