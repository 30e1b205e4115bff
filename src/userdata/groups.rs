//! Dynamic membership groups.
//!
//! A group entry in a user list does not name a user; it names a badge or
//! role that is re-evaluated per message against the message's tag map.
//! Groups are per-channel: a group only fires for messages from channels
//! it has been configured for.

use crate::chat::ChatMessage;
use regex::Regex;
use std::sync::LazyLock;

/// Token grammar: `$group` or `$group[channel]`, matched case-insensitively
/// against already-lowercased entries.
static GROUP_TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\$broadcaster|\$mods|\$vips|\$subs|\$tier3subs|\$tier2subs|\$tier1subs|\$partners|\$founders|\$staff|\$prime|\$turbo|\$users)(?:\[(#?[a-z0-9_]+)\])?$",
    )
    .expect("group token regex is valid")
});

/// The fixed set of dynamic group identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpecialGroup {
    Broadcaster,
    Mods,
    Vips,
    Subs,
    Tier3Subs,
    Tier2Subs,
    Tier1Subs,
    Partners,
    Founders,
    Staff,
    Prime,
    Turbo,
    /// Everyone in an explicitly listed channel.
    Users,
}

impl SpecialGroup {
    pub const ALL: [SpecialGroup; 13] = [
        Self::Broadcaster,
        Self::Mods,
        Self::Vips,
        Self::Subs,
        Self::Tier3Subs,
        Self::Tier2Subs,
        Self::Tier1Subs,
        Self::Partners,
        Self::Founders,
        Self::Staff,
        Self::Prime,
        Self::Turbo,
        Self::Users,
    ];

    /// The `$`-prefixed token used in config files and chat commands.
    pub fn token(self) -> &'static str {
        match self {
            Self::Broadcaster => "$broadcaster",
            Self::Mods => "$mods",
            Self::Vips => "$vips",
            Self::Subs => "$subs",
            Self::Tier3Subs => "$tier3subs",
            Self::Tier2Subs => "$tier2subs",
            Self::Tier1Subs => "$tier1subs",
            Self::Partners => "$partners",
            Self::Founders => "$founders",
            Self::Staff => "$staff",
            Self::Prime => "$prime",
            Self::Turbo => "$turbo",
            Self::Users => "$users",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|g| g.token() == token)
    }

    /// Parse a lowercased list entry as a group token.
    ///
    /// Returns the group and the optional channel limiter (`#`-normalized).
    /// `None` means the entry is a plain username.
    pub fn parse_entry(entry: &str) -> Option<(Self, Option<String>)> {
        let captures = GROUP_TOKEN_REGEX.captures(entry)?;
        let group = Self::from_token(&captures[1])?;
        let channel = captures.get(2).map(|m| {
            let chan = m.as_str();
            if chan.starts_with('#') {
                chan.to_string()
            } else {
                format!("#{chan}")
            }
        });
        Some((group, channel))
    }

    /// Evaluate the group's badge/tag predicate against one message.
    ///
    /// The per-channel gate is applied by the caller; this only inspects
    /// the tag map.
    pub fn matches(self, msg: &ChatMessage) -> bool {
        match self {
            Self::Broadcaster => msg.badges().contains("broadcaster"),
            Self::Mods => msg.tag_or("mod", "0") != "0",
            Self::Vips => msg.badges().contains("vip"),
            Self::Subs => msg.tag_or("subscriber", "0") != "0",
            Self::Tier3Subs => subscriber_tier(msg) == Some(3),
            Self::Tier2Subs => subscriber_tier(msg) == Some(2),
            Self::Tier1Subs => subscriber_tier(msg) == Some(1),
            Self::Partners => msg.badges().contains("partner"),
            Self::Founders => msg.badges().contains("founder"),
            Self::Staff => {
                msg.badges().contains("staff") || msg.badges().contains("admin")
            }
            Self::Prime => msg.badges().contains("premium"),
            Self::Turbo => msg.badges().contains("turbo"),
            Self::Users => true,
        }
    }
}

/// Decode the subscriber tier from a `subscriber/<code>` badge.
///
/// Tier 3 subs carry codes 3xyz, tier 2 subs 2xyz and tier 1 subs just the
/// bare month count (code / 1000 == 0).
fn subscriber_tier(msg: &ChatMessage) -> Option<u8> {
    if msg.tag_or("subscriber", "0") == "0" {
        return None;
    }
    for badge in msg.badges().split(',') {
        let mut parts = badge.split('/');
        if parts.next() == Some("subscriber") {
            let code: u32 = parts.next()?.parse().ok()?;
            return Some(match code / 1000 {
                0 => 1,
                tier => tier.min(u32::from(u8::MAX)) as u8,
            });
        }
    }
    None
}
